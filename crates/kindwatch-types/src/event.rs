use serde::{Deserialize, Serialize};

use crate::{OperationKind, ReconciliationOutcome, TaskStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KindwatchEvent {
    OperationSubmitted {
        session_id: String,
        kind: OperationKind,
        resource: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_id: Option<String>,
    },
    TaskUpdated {
        session_id: String,
        task_id: String,
        status: TaskStatus,
    },
    ProgressStalled {
        session_id: String,
        task_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<u8>,
    },
    OperationFinished {
        outcome: ReconciliationOutcome,
    },
    ResourceRemoved {
        session_id: String,
        resource: String,
    },
}

impl KindwatchEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            KindwatchEvent::OperationSubmitted { .. } => "operation.submitted",
            KindwatchEvent::TaskUpdated { .. } => "task.updated",
            KindwatchEvent::ProgressStalled { .. } => "task.stalled",
            KindwatchEvent::OperationFinished { .. } => "operation.finished",
            KindwatchEvent::ResourceRemoved { .. } => "resource.removed",
        }
    }
}
