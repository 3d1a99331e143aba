use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    Pending,
    Running,
    Completed,
    Failed,
    Unknown,
}

impl TaskPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskPhase::Pending => "pending",
            TaskPhase::Running => "running",
            TaskPhase::Completed => "completed",
            TaskPhase::Failed => "failed",
            TaskPhase::Unknown => "unknown",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskPhase::Completed | TaskPhase::Failed)
    }
}

/// Canonical view of one task-status payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub phase: TaskPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default)]
    pub message: String,
    pub success: bool,
    /// Lowercased status string the phase was derived from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_state: Option<String>,
    #[serde(default)]
    pub raw: Value,
}

impl TaskStatus {
    pub fn unknown(raw: Value) -> Self {
        Self {
            phase: TaskPhase::Unknown,
            progress: None,
            message: String::new(),
            success: false,
            backend_state: None,
            raw,
        }
    }

    /// Equality over what a user can see; `raw` carries timestamps that
    /// change on every poll.
    pub fn same_observation(&self, other: &TaskStatus) -> bool {
        self.phase == other.phase
            && self.progress == other.progress
            && self.message == other.message
            && self.success == other.success
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeResult {
    pub probe: String,
    pub found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl ProbeResult {
    pub fn answered(&self) -> bool {
        self.error.is_none()
    }
}
