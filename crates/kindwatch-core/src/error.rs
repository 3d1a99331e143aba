use thiserror::Error;

use kindwatch_types::OperationKind;

/// Failure of a single backend request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("network error calling {url}: {message}")]
    Network { url: String, message: String },

    #[error("{url} returned HTTP {status}: {body}")]
    Http {
        url: String,
        status: u16,
        body: String,
    },

    #[error("invalid response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("circuit breaker is open")]
    CircuitOpen,
}

impl TransportError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::Http { status: 404, .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }

    /// The backend may have acted on the request even though no answer
    /// reached us.
    pub fn outcome_unknown(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout { .. }
                | TransportError::Network { .. }
                | TransportError::Decode { .. }
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            TransportError::Timeout { .. } => "TRANSPORT_TIMEOUT",
            TransportError::Network { .. } => "TRANSPORT_NETWORK",
            TransportError::Http { .. } => "TRANSPORT_HTTP",
            TransportError::Decode { .. } => "TRANSPORT_DECODE",
            TransportError::CircuitOpen => "TRANSPORT_CIRCUIT_OPEN",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("task {task_id} polling timed out after {attempts} attempts ({elapsed_ms}ms)")]
    TaskPollingTimeout {
        task_id: String,
        attempts: u32,
        elapsed_ms: u64,
        last_error: Option<String>,
    },
}

/// Errors that escape a reconciliation session. Everything else is folded
/// into the session's outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("a {kind} session for `{resource}` is already running")]
    DuplicateSession {
        kind: OperationKind,
        resource: String,
    },

    #[error("reconciliation session cancelled")]
    Cancelled,
}

impl ReconcileError {
    pub fn code(&self) -> &'static str {
        match self {
            ReconcileError::InvalidOperation(_) => "INVALID_OPERATION",
            ReconcileError::DuplicateSession { .. } => "DUPLICATE_SESSION",
            ReconcileError::Cancelled => "CANCELLED",
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
