#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};

use kindwatch_core::{
    KindwatchConfig, ReconcileError, ReconcileObserver, Reconciler, TransportError,
};
use kindwatch_types::{ReconciliationOutcome, TaskStatus};

pub use kindwatch_core::testing::{http_error, ScriptedTransport, Step};

pub const SUBMIT_CREATE: &str = "/api/cluster/create";
pub const SUBMIT_DELETE: &str = "/api/cluster/delete";
pub const TASK: &str = "/api/tasks/abc123";
pub const STATUS: &str = "/api/cluster/status";
pub const LIST: &str = "/api/clusters/list";
pub const NODES: &str = "/api/cluster/demo/nodes";
pub const DETAILS: &str = "/api/cluster/demo/details";
pub const PROBE_PATHS: [&str; 4] = [STATUS, LIST, NODES, DETAILS];

pub fn probe_calls(transport: &ScriptedTransport) -> usize {
    transport.calls_to_any(&PROBE_PATHS)
}

pub fn not_found(path: &str) -> TransportError {
    http_error(path, 404)
}

pub fn accepted(task_id: &str) -> Step {
    Step::Respond(json!({
        "status": "accepted",
        "message": "Cluster creation started",
        "data": {"task_id": task_id}
    }))
}

pub fn running(progress: Option<u8>) -> Step {
    let mut body = json!({"task_id": "abc123", "status": "running", "completed": false});
    if let Some(progress) = progress {
        body["progress"] = json!(progress);
    }
    Step::Respond(body)
}

pub fn listing(names: &[&str]) -> Step {
    let clusters: Vec<Value> = names.iter().map(|n| json!({"name": n})).collect();
    Step::Respond(json!({"status": "success", "data": {"clusters": clusters}}))
}

/// Default config with jitter removed so timings are exact.
pub fn test_config() -> KindwatchConfig {
    let mut config = KindwatchConfig::default();
    config.poller.lifecycle.backoff.max_jitter_ms = 0;
    config.poller.update.backoff.max_jitter_ms = 0;
    config
}

pub fn reconciler(transport: Arc<ScriptedTransport>, config: KindwatchConfig) -> Reconciler {
    Reconciler::new(transport, config)
}

#[derive(Default)]
pub struct Recorder {
    pub updates: Mutex<Vec<TaskStatus>>,
    pub stalls: AtomicU32,
    pub completed: Mutex<Vec<ReconciliationOutcome>>,
    pub errors: Mutex<Vec<ReconcileError>>,
}

impl Recorder {
    pub fn stall_count(&self) -> u32 {
        self.stalls.load(Ordering::SeqCst)
    }
}

impl ReconcileObserver for Recorder {
    fn on_update(&self, status: &TaskStatus) {
        self.updates.lock().push(status.clone());
    }

    fn on_stalled(&self, _progress: Option<u8>) {
        self.stalls.fetch_add(1, Ordering::SeqCst);
    }

    fn on_complete(&self, outcome: &ReconciliationOutcome) {
        self.completed.lock().push(outcome.clone());
    }

    fn on_error(&self, error: &ReconcileError) {
        self.errors.lock().push(error.clone());
    }
}

pub const SECOND: Duration = Duration::from_secs(1);
