use kindwatch_types::{ReconciliationOutcome, TaskStatus};

use crate::error::ReconcileError;

/// Callbacks a presentation layer registers on one reconciliation session.
///
/// Every method has an empty default, so implementors only override what
/// they render. Callbacks run on the session task and should return quickly.
pub trait ReconcileObserver: Send + Sync {
    /// Fired only when the normalized status differs from the previous tick.
    fn on_update(&self, _status: &TaskStatus) {}

    /// Progress has not moved for several ticks; an early existence check
    /// is about to run.
    fn on_stalled(&self, _progress: Option<u8>) {}

    fn on_complete(&self, _outcome: &ReconciliationOutcome) {}

    fn on_error(&self, _error: &ReconcileError) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ReconcileObserver for NoopObserver {}
