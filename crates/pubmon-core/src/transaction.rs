//! Publish request and response types.
//!
//! Building the transaction payload and sending it are the transport's job;
//! this module only carries what the instrumentation layer needs to tag and
//! time a publish.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Kind of transaction being published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    AccountCreate,
    AccountDelete,
    AccountUpdate,
    ConsensusCreateTopic,
    ConsensusDeleteTopic,
    ConsensusSubmitMessage,
    ConsensusUpdateTopic,
    CryptoTransfer,
    TokenAssociate,
    TokenBurn,
    TokenCreate,
    TokenDelete,
    TokenDissociate,
    TokenFreeze,
    TokenGrantKyc,
    TokenMint,
    TokenRevokeKyc,
    TokenTransfer,
    TokenUnfreeze,
    TokenUpdate,
    TokenWipe,
}

impl OperationType {
    /// Every operation type, in declaration order.
    pub const ALL: [OperationType; 21] = [
        OperationType::AccountCreate,
        OperationType::AccountDelete,
        OperationType::AccountUpdate,
        OperationType::ConsensusCreateTopic,
        OperationType::ConsensusDeleteTopic,
        OperationType::ConsensusSubmitMessage,
        OperationType::ConsensusUpdateTopic,
        OperationType::CryptoTransfer,
        OperationType::TokenAssociate,
        OperationType::TokenBurn,
        OperationType::TokenCreate,
        OperationType::TokenDelete,
        OperationType::TokenDissociate,
        OperationType::TokenFreeze,
        OperationType::TokenGrantKyc,
        OperationType::TokenMint,
        OperationType::TokenRevokeKyc,
        OperationType::TokenTransfer,
        OperationType::TokenUnfreeze,
        OperationType::TokenUpdate,
        OperationType::TokenWipe,
    ];

    /// The label used in metric tags and log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::AccountCreate => "ACCOUNT_CREATE",
            OperationType::AccountDelete => "ACCOUNT_DELETE",
            OperationType::AccountUpdate => "ACCOUNT_UPDATE",
            OperationType::ConsensusCreateTopic => "CONSENSUS_CREATE_TOPIC",
            OperationType::ConsensusDeleteTopic => "CONSENSUS_DELETE_TOPIC",
            OperationType::ConsensusSubmitMessage => "CONSENSUS_SUBMIT_MESSAGE",
            OperationType::ConsensusUpdateTopic => "CONSENSUS_UPDATE_TOPIC",
            OperationType::CryptoTransfer => "CRYPTO_TRANSFER",
            OperationType::TokenAssociate => "TOKEN_ASSOCIATE",
            OperationType::TokenBurn => "TOKEN_BURN",
            OperationType::TokenCreate => "TOKEN_CREATE",
            OperationType::TokenDelete => "TOKEN_DELETE",
            OperationType::TokenDissociate => "TOKEN_DISSOCIATE",
            OperationType::TokenFreeze => "TOKEN_FREEZE",
            OperationType::TokenGrantKyc => "TOKEN_GRANT_KYC",
            OperationType::TokenMint => "TOKEN_MINT",
            OperationType::TokenRevokeKyc => "TOKEN_REVOKE_KYC",
            OperationType::TokenTransfer => "TOKEN_TRANSFER",
            OperationType::TokenUnfreeze => "TOKEN_UNFREEZE",
            OperationType::TokenUpdate => "TOKEN_UPDATE",
            OperationType::TokenWipe => "TOKEN_WIPE",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown operation type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation type: {0}")]
pub struct ParseOperationTypeError(pub String);

impl FromStr for OperationType {
    type Err = ParseOperationTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        OperationType::ALL
            .into_iter()
            .find(|op| op.as_str() == normalized)
            .ok_or_else(|| ParseOperationTypeError(s.to_string()))
    }
}

/// A single publish request handed to the instrumentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    /// Scenario this request belongs to; used only as a metrics dimension.
    pub scenario_name: Arc<str>,
    /// Kind of transaction being published.
    pub operation_type: OperationType,
}

impl PublishRequest {
    /// Create a new publish request.
    pub fn new(scenario_name: impl Into<Arc<str>>, operation_type: OperationType) -> Self {
        Self {
            scenario_name: scenario_name.into(),
            operation_type,
        }
    }
}

/// Consensus-level confirmation of a published transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Consensus status label (e.g. `SUCCESS`).
    pub status: String,
}

impl Receipt {
    /// Create a receipt with the given status.
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }
}

/// What the transport returned for a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResponse {
    /// Wall-clock time the transport received the broadcast response.
    pub timestamp: SystemTime,
    /// Transaction ID assigned by the transport.
    pub transaction_id: String,
    /// Present only once consensus-level confirmation exists.
    pub receipt: Option<Receipt>,
}

impl PublishResponse {
    /// Create a response without a receipt.
    pub fn new(timestamp: SystemTime, transaction_id: impl Into<String>) -> Self {
        Self {
            timestamp,
            transaction_id: transaction_id.into(),
            receipt: None,
        }
    }

    /// Attach a receipt.
    pub fn with_receipt(mut self, receipt: Receipt) -> Self {
        self.receipt = Some(receipt);
        self
    }

    /// Check whether consensus confirmation is present.
    pub fn has_receipt(&self) -> bool {
        self.receipt.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_type_display_and_parse() {
        for op in OperationType::ALL {
            assert_eq!(op.to_string().parse::<OperationType>(), Ok(op));
        }
        assert_eq!(
            "consensus-submit-message".parse::<OperationType>(),
            Ok(OperationType::ConsensusSubmitMessage)
        );
        assert!("NOT_A_TYPE".parse::<OperationType>().is_err());
    }

    #[test]
    fn test_operation_type_serde_matches_display() {
        let json = serde_json::to_string(&OperationType::TokenGrantKyc).unwrap();
        assert_eq!(json, "\"TOKEN_GRANT_KYC\"");
    }

    #[test]
    fn test_response_receipt() {
        let response = PublishResponse::new(SystemTime::now(), "0.0.2@1.1");
        assert!(!response.has_receipt());

        let response = response.with_receipt(Receipt::new("SUCCESS"));
        assert!(response.has_receipt());
    }
}
