//! Core error types.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::transaction::OperationType;

/// Failures a publish function may return.
///
/// The set is closed so that every failure maps to exactly one outcome.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Rejected by the node before reaching consensus.
    #[error("precheck failed with {status} for transaction {transaction_id}: {message}")]
    Precheck {
        status: String,
        transaction_id: String,
        message: String,
    },

    /// Reached consensus but the receipt reported a failure.
    #[error("receipt for transaction {transaction_id} reported {status}")]
    Receipt {
        status: String,
        transaction_id: String,
    },

    /// The transport gave up waiting.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The publish was cancelled before it completed.
    #[error("publish cancelled")]
    Cancelled,

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other transport fault.
    #[error("{kind}: {message}")]
    Other { kind: String, message: String },
}

impl TransportError {
    /// Create a precheck failure.
    pub fn precheck(
        status: impl Into<String>,
        transaction_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        TransportError::Precheck {
            status: status.into(),
            transaction_id: transaction_id.into(),
            message: message.into(),
        }
    }

    /// Create a receipt failure.
    pub fn receipt(status: impl Into<String>, transaction_id: impl Into<String>) -> Self {
        TransportError::Receipt {
            status: status.into(),
            transaction_id: transaction_id.into(),
        }
    }

    /// Create a failure of an arbitrary kind.
    pub fn other(kind: impl Into<String>, message: impl Into<String>) -> Self {
        TransportError::Other {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// The failure handed back to callers of `record()` for any non-success
/// outcome. The original transport error is its source.
#[derive(Debug, Error)]
#[error("failed to publish {operation_type} for scenario {scenario}: {status}")]
pub struct PublishError {
    scenario: Arc<str>,
    operation_type: OperationType,
    status: String,
    #[source]
    source: TransportError,
}

impl PublishError {
    pub(crate) fn new(
        scenario: Arc<str>,
        operation_type: OperationType,
        status: impl Into<String>,
        source: TransportError,
    ) -> Self {
        Self {
            scenario,
            operation_type,
            status: status.into(),
            source,
        }
    }

    /// Scenario the failed request belonged to.
    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    /// Operation type of the failed request.
    pub fn operation_type(&self) -> OperationType {
        self.operation_type
    }

    /// Status label the failure was tallied under.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// The original transport error.
    pub fn cause(&self) -> &TransportError {
        &self.source
    }

    /// Consume the wrapper and return the original transport error.
    pub fn into_cause(self) -> TransportError {
        self.source
    }
}

/// Metric registration failures raised by a sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The sink refuses to create more series.
    #[error("cannot register {name}: series limit of {limit} reached")]
    CardinalityExceeded { name: String, limit: usize },

    /// The name is already registered as a different kind of meter.
    #[error("cannot register {name} as a {expected}: name already used by another meter kind")]
    KindMismatch { name: String, expected: &'static str },
}

/// Errors returned by the instrumentation layer.
#[derive(Debug, Error)]
pub enum Error {
    /// The publish failed; the wrapped transport error is preserved.
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// A metric for a new tag could not be registered. This is a
    /// configuration error and is not retried. If the publish itself also
    /// failed, its wrapping failure is kept in `publish`.
    #[error("metric registration failed: {source}")]
    Registration {
        #[source]
        source: RegistryError,
        publish: Option<PublishError>,
    },
}

impl Error {
    /// The publish failure carried by this error, if any.
    pub fn publish_error(&self) -> Option<&PublishError> {
        match self {
            Error::Publish(e) => Some(e),
            Error::Registration { publish, .. } => publish.as_ref(),
        }
    }

    /// Check if this is a fatal metric registration failure.
    pub fn is_registration(&self) -> bool {
        matches!(self, Error::Registration { .. })
    }
}

/// Result type for instrumentation operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_publish_error_preserves_cause() {
        let err = PublishError::new(
            Arc::from("scenario"),
            OperationType::CryptoTransfer,
            "BUSY",
            TransportError::precheck("BUSY", "0.0.2@1.1", "node busy"),
        );

        assert_eq!(err.status(), "BUSY");
        assert!(matches!(err.cause(), TransportError::Precheck { status, .. } if status == "BUSY"));

        let source = err.source().expect("source");
        assert!(source.to_string().contains("node busy"));
    }

    #[test]
    fn test_error_publish_accessor() {
        let publish = PublishError::new(
            Arc::from("s"),
            OperationType::TokenMint,
            "Timeout",
            TransportError::Timeout(Duration::from_secs(1)),
        );
        let err = Error::Registration {
            source: RegistryError::CardinalityExceeded {
                name: "pubmon.publish.submit".to_string(),
                limit: 1,
            },
            publish: Some(publish),
        };

        assert!(err.is_registration());
        assert_eq!(err.publish_error().map(|e| e.status()), Some("Timeout"));
    }
}
