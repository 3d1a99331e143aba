use serde::{Deserialize, Serialize};

use crate::{OperationKind, ProbeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomePhase {
    Completed,
    Failed,
    Timeout,
}

impl OutcomePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomePhase::Completed => "completed",
            OutcomePhase::Failed => "failed",
            OutcomePhase::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistenceVerdict {
    Found,
    NotFound,
    /// Every probe errored or timed out; nothing was actually observed.
    Inconclusive,
}

impl ExistenceVerdict {
    pub fn as_str(self) -> &'static str {
        match self {
            ExistenceVerdict::Found => "found",
            ExistenceVerdict::NotFound => "not_found",
            ExistenceVerdict::Inconclusive => "inconclusive",
        }
    }

    /// True when the verdict positively shows the wanted presence. An
    /// inconclusive verdict never confirms anything.
    pub fn confirms(self, expected_presence: bool) -> bool {
        match self {
            ExistenceVerdict::Found => expected_presence,
            ExistenceVerdict::NotFound => !expected_presence,
            ExistenceVerdict::Inconclusive => false,
        }
    }
}

/// Final, user-facing result of one reconciliation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    pub session_id: String,
    pub kind: OperationKind,
    pub resource: String,
    pub success: bool,
    pub phase: OutcomePhase,
    pub message: String,
    pub overridden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<ExistenceVerdict>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub probes: Vec<ProbeResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inconclusive_never_confirms() {
        assert!(!ExistenceVerdict::Inconclusive.confirms(true));
        assert!(!ExistenceVerdict::Inconclusive.confirms(false));
        assert!(ExistenceVerdict::Found.confirms(true));
        assert!(ExistenceVerdict::NotFound.confirms(false));
        assert!(!ExistenceVerdict::NotFound.confirms(true));
    }
}
