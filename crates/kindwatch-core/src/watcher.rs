use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use kindwatch_types::{ExistenceVerdict, OperationKind, ProbeResult};

use crate::config::WatcherSettings;
use crate::oracle::{ExistenceOracle, OracleReport};

/// What the watcher waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchTarget {
    Present,
    Absent,
}

impl WatchTarget {
    pub fn for_kind(kind: OperationKind) -> Self {
        if kind.expected_presence() {
            WatchTarget::Present
        } else {
            WatchTarget::Absent
        }
    }

    pub fn satisfied_by(self, verdict: ExistenceVerdict) -> bool {
        verdict.confirms(self == WatchTarget::Present)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchState {
    Watching,
    Found,
    Exhausted,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct WatchReport {
    pub resource: String,
    pub target: WatchTarget,
    pub state: WatchState,
    pub attempts: u32,
    pub last_verdict: Option<ExistenceVerdict>,
    pub last_probes: Vec<ProbeResult>,
    pub elapsed_ms: u64,
}

/// Callbacks for a running watch. All optional.
pub trait WatchObserver: Send + Sync {
    fn on_tick(&self, _attempt: u32, _report: &OracleReport) {}
    fn on_found(&self, _report: &WatchReport) {}
    fn on_exhausted(&self, _report: &WatchReport) {}
}

pub struct NoopWatchObserver;

impl WatchObserver for NoopWatchObserver {}

/// Asks the oracle on a fixed cadence until the target state shows up or
/// the attempt ceiling is reached.
#[derive(Clone)]
pub struct PeriodicWatcher {
    oracle: Arc<ExistenceOracle>,
    interval: Duration,
    max_attempts: u32,
}

impl PeriodicWatcher {
    pub fn new(oracle: Arc<ExistenceOracle>, settings: &WatcherSettings) -> Self {
        Self {
            oracle,
            interval: Duration::from_millis(settings.interval_ms.max(1)),
            max_attempts: settings.max_attempts.max(1),
        }
    }

    pub async fn run(
        &self,
        resource: &str,
        target: WatchTarget,
        cancel: CancellationToken,
        observer: &dyn WatchObserver,
    ) -> WatchReport {
        let started = Instant::now();
        let mut report = WatchReport {
            resource: resource.to_string(),
            target,
            state: WatchState::Watching,
            attempts: 0,
            last_verdict: None,
            last_probes: Vec::new(),
            elapsed_ms: 0,
        };

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while report.attempts < self.max_attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.state = WatchState::Cancelled;
                    break;
                }
                _ = ticker.tick() => {}
            }

            report.attempts += 1;
            let oracle_report = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.state = WatchState::Cancelled;
                    break;
                }
                oracle_report = self.oracle.check(resource) => oracle_report,
            };
            debug!(
                resource,
                attempt = report.attempts,
                verdict = oracle_report.verdict.as_str(),
                "watch tick"
            );
            observer.on_tick(report.attempts, &oracle_report);
            report.last_verdict = Some(oracle_report.verdict);
            report.last_probes = oracle_report.results;

            if target.satisfied_by(oracle_report.verdict) {
                report.state = WatchState::Found;
                break;
            }
        }

        if report.state == WatchState::Watching {
            report.state = WatchState::Exhausted;
        }
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        match report.state {
            WatchState::Found => {
                info!(resource, attempts = report.attempts, "watch target reached");
                observer.on_found(&report);
            }
            WatchState::Exhausted => {
                info!(resource, attempts = report.attempts, "watch attempts exhausted");
                observer.on_exhausted(&report);
            }
            WatchState::Cancelled | WatchState::Watching => {}
        }
        report
    }

    /// Runs the watch on its own task.
    pub fn spawn(
        &self,
        resource: impl Into<String>,
        target: WatchTarget,
        observer: Arc<dyn WatchObserver>,
    ) -> WatchHandle {
        let cancel = CancellationToken::new();
        let state = Arc::new(Mutex::new(WatchState::Watching));
        let watcher = self.clone();
        let resource = resource.into();
        let task_cancel = cancel.clone();
        let task_state = state.clone();
        let join = tokio::spawn(async move {
            let report = watcher
                .run(&resource, target, task_cancel, observer.as_ref())
                .await;
            *task_state.lock() = report.state;
            report
        });
        WatchHandle {
            cancel,
            state,
            join,
        }
    }
}

pub struct WatchHandle {
    cancel: CancellationToken,
    state: Arc<Mutex<WatchState>>,
    join: JoinHandle<WatchReport>,
}

impl WatchHandle {
    /// Halts further ticks; an in-flight oracle pass is abandoned.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> WatchState {
        *self.state.lock()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn join(self) -> Option<WatchReport> {
        self.join.await.ok()
    }
}
