//! Outcome classification and metric tags.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::error::TransportError;
use crate::transaction::OperationType;

/// Status label of a successful publish.
pub const SUCCESS: &str = "SUCCESS";

pub const TAG_SCENARIO: &str = "scenario";
pub const TAG_STATUS: &str = "status";
pub const TAG_TYPE: &str = "type";

/// Classified result of one publish call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Rejected before consensus.
    PrecheckError(String),
    /// Rejected per the consensus receipt.
    ReceiptError(String),
    /// Any other failure, named by its kind.
    OtherError(Cow<'static, str>),
}

impl Outcome {
    /// Classify a transport failure.
    pub fn classify(error: &TransportError) -> Self {
        match error {
            TransportError::Precheck { status, .. } => Outcome::PrecheckError(status.clone()),
            TransportError::Receipt { status, .. } => Outcome::ReceiptError(status.clone()),
            TransportError::Timeout(_) => Outcome::OtherError(Cow::Borrowed("Timeout")),
            TransportError::Cancelled => Outcome::OtherError(Cow::Borrowed("Cancelled")),
            TransportError::Io(_) => Outcome::OtherError(Cow::Borrowed("IoError")),
            TransportError::Other { kind, .. } => Outcome::OtherError(Cow::Owned(kind.clone())),
        }
    }

    /// The label this outcome is tagged and tallied under.
    pub fn status_label(&self) -> &str {
        match self {
            Outcome::Success => SUCCESS,
            Outcome::PrecheckError(status) | Outcome::ReceiptError(status) => status,
            Outcome::OtherError(kind) => kind,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    fn into_label(self) -> Cow<'static, str> {
        match self {
            Outcome::Success => Cow::Borrowed(SUCCESS),
            Outcome::PrecheckError(status) | Outcome::ReceiptError(status) => Cow::Owned(status),
            Outcome::OtherError(kind) => kind,
        }
    }
}

/// Key of one metric series: (scenario, outcome status, operation type).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    scenario: Arc<str>,
    status: Cow<'static, str>,
    operation_type: OperationType,
}

impl Tag {
    pub fn new(scenario: Arc<str>, outcome: Outcome, operation_type: OperationType) -> Self {
        Self {
            scenario,
            status: outcome.into_label(),
            operation_type,
        }
    }

    pub fn scenario(&self) -> &Arc<str> {
        &self.scenario
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn operation_type(&self) -> OperationType {
        self.operation_type
    }

    /// The (scenario, type) projection used by duration gauges.
    pub fn scenario_key(&self) -> ScenarioKey {
        ScenarioKey {
            scenario: self.scenario.clone(),
            operation_type: self.operation_type,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.scenario, self.status, self.operation_type)
    }
}

/// Key of a per-scenario series that ignores the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScenarioKey {
    pub scenario: Arc<str>,
    pub operation_type: OperationType,
}
