use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{info, warn};
use uuid::Uuid;

use kindwatch_observability::{emit_event, ObservabilityEvent, ProcessKind};
use kindwatch_types::{
    ExistenceVerdict, KindwatchEvent, Operation, OperationKind, OutcomePhase,
    ReconciliationOutcome, TaskHandle,
};

use crate::config::KindwatchConfig;
use crate::error::{ReconcileError, Result};
use crate::event_bus::EventBus;
use crate::guard::SessionGuard;
use crate::observer::ReconcileObserver;
use crate::oracle::{ExistenceOracle, OracleReport};
use crate::poller::{PollEvent, PollTerminal, TaskPoller};
use crate::probes::build_probes;
use crate::submit::{interpret_submit_response, submit_body, SubmitReply};
use crate::transport::{request_with_deadline, Transport, TransportRequest};
use crate::validate::validate_operation;
use crate::watcher::{NoopWatchObserver, PeriodicWatcher, WatchState, WatchTarget};

/// Drives operations from submission to one final outcome.
///
/// Cheap to clone; clones share the transport, the oracle, the event bus
/// and the session guard. Sessions themselves share nothing else.
#[derive(Clone)]
pub struct Reconciler {
    transport: Arc<dyn Transport>,
    config: Arc<KindwatchConfig>,
    oracle: Arc<ExistenceOracle>,
    bus: EventBus,
    guard: SessionGuard,
}

/// Per-session state, owned by the session's flow of control.
struct Session {
    id: String,
    operation: Operation,
    observer: Arc<dyn ReconcileObserver>,
    cancel: CancellationToken,
}

impl Session {
    fn expected_presence(&self) -> bool {
        self.operation.kind.expected_presence()
    }
}

impl Reconciler {
    pub fn new(transport: Arc<dyn Transport>, config: KindwatchConfig) -> Self {
        let probes = build_probes(
            &config.oracle.probe_order,
            transport.clone(),
            &config.backend.routes,
        );
        let oracle = Arc::new(ExistenceOracle::new(probes, &config.oracle));
        let guard = SessionGuard::new(config.guard.enabled);
        Self {
            transport,
            config: Arc::new(config),
            oracle,
            bus: EventBus::new(),
            guard,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn oracle(&self) -> Arc<ExistenceOracle> {
        self.oracle.clone()
    }

    pub fn config(&self) -> &KindwatchConfig {
        &self.config
    }

    pub fn watcher(&self) -> PeriodicWatcher {
        PeriodicWatcher::new(self.oracle.clone(), &self.config.watcher)
    }

    pub async fn run(
        &self,
        operation: Operation,
        observer: Arc<dyn ReconcileObserver>,
    ) -> Result<ReconciliationOutcome> {
        self.run_with_cancel(operation, observer, CancellationToken::new())
            .await
    }

    pub async fn run_with_cancel(
        &self,
        operation: Operation,
        observer: Arc<dyn ReconcileObserver>,
        cancel: CancellationToken,
    ) -> Result<ReconciliationOutcome> {
        self.run_session(Uuid::new_v4().to_string(), operation, observer, cancel)
            .await
    }

    /// Runs the session on its own task. Dropping the handle cancels it.
    pub fn spawn(
        &self,
        operation: Operation,
        observer: Arc<dyn ReconcileObserver>,
    ) -> SessionHandle {
        let session_id = Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        let reconciler = self.clone();
        let task_session_id = session_id.clone();
        let task_cancel = cancel.clone();
        let join = tokio::spawn(async move {
            reconciler
                .run_session(task_session_id, operation, observer, task_cancel)
                .await
        });
        SessionHandle {
            session_id,
            cancel: cancel.clone(),
            drop_guard: cancel.drop_guard(),
            join,
        }
    }

    async fn run_session(
        &self,
        session_id: String,
        operation: Operation,
        observer: Arc<dyn ReconcileObserver>,
        cancel: CancellationToken,
    ) -> Result<ReconciliationOutcome> {
        if let Err(err) = validate_operation(&operation) {
            observer.on_error(&err);
            return Err(err);
        }
        let _permit = match self.guard.acquire(&operation) {
            Ok(permit) => permit,
            Err(err) => {
                observer.on_error(&err);
                return Err(err);
            }
        };

        let session = Session {
            id: session_id,
            operation,
            observer,
            cancel,
        };

        match self.drive(&session).await {
            Ok(outcome) => {
                self.finish(&session, &outcome);
                Ok(outcome)
            }
            Err(err) => {
                emit_event(
                    tracing::Level::WARN,
                    ProcessKind::Embedded,
                    ObservabilityEvent {
                        event: "reconcile.aborted",
                        component: "reconciler",
                        session_id: Some(&session.id),
                        operation: Some(session.operation.kind.as_str()),
                        resource: Some(&session.operation.target),
                        error_code: Some(err.code()),
                        ..Default::default()
                    },
                );
                session.observer.on_error(&err);
                Err(err)
            }
        }
    }

    async fn drive(&self, session: &Session) -> Result<ReconciliationOutcome> {
        let operation = &session.operation;
        emit_event(
            tracing::Level::INFO,
            ProcessKind::Embedded,
            ObservabilityEvent {
                event: "reconcile.submit",
                component: "reconciler",
                session_id: Some(&session.id),
                operation: Some(operation.kind.as_str()),
                resource: Some(&operation.target),
                ..Default::default()
            },
        );

        let routes = &self.config.backend.routes;
        let request = TransportRequest::post(
            routes.submit_path(operation.kind, &operation.target),
            submit_body(operation),
            Duration::from_millis(self.config.backend.submit_timeout_ms.max(1)),
        );
        let submitted = tokio::select! {
            biased;
            _ = session.cancel.cancelled() => return Err(ReconcileError::Cancelled),
            result = request_with_deadline(self.transport.as_ref(), request) => result,
        };

        match submitted {
            Ok(payload) => match interpret_submit_response(&payload) {
                SubmitReply::Task(task_id) => {
                    self.publish_submitted(session, Some(task_id.clone()));
                    let handle = TaskHandle::new(task_id, operation.clone());
                    self.track_task(session, handle).await
                }
                SubmitReply::Immediate {
                    success: true,
                    message,
                } => {
                    self.publish_submitted(session, None);
                    Ok(self.outcome(
                        session,
                        true,
                        OutcomePhase::Completed,
                        message,
                        false,
                        None,
                        None,
                    ))
                }
                SubmitReply::Immediate {
                    success: false,
                    message,
                } => {
                    self.publish_submitted(session, None);
                    self.confirm_or_fail(session, OutcomePhase::Failed, message, None)
                        .await
                }
                SubmitReply::Acknowledged { .. } => {
                    self.publish_submitted(session, None);
                    self.watch_for_effect(session).await
                }
            },
            Err(err) if err.outcome_unknown() => {
                warn!(
                    session_id = %session.id,
                    "submit outcome unknown ({}), watching for the effect instead",
                    err
                );
                self.watch_for_effect(session).await
            }
            Err(err) => {
                self.confirm_or_fail(session, OutcomePhase::Failed, err.to_string(), None)
                    .await
            }
        }
    }

    async fn track_task(
        &self,
        session: &Session,
        handle: TaskHandle,
    ) -> Result<ReconciliationOutcome> {
        let settings = &self.config.poller;
        let profile = settings.profile(handle.operation.kind.class()).clone();
        let task_id = handle.id.clone();
        let mut poller = TaskPoller::new(
            self.transport.clone(),
            &self.config.backend.routes,
            handle.id,
            profile,
            settings.stall_threshold,
            settings.not_found_threshold,
            session.cancel.clone(),
        );

        while let Some(event) = poller.next_event().await {
            match event {
                PollEvent::Updated(status) => {
                    session.observer.on_update(&status);
                    self.bus.publish(KindwatchEvent::TaskUpdated {
                        session_id: session.id.clone(),
                        task_id: task_id.clone(),
                        status,
                    });
                }
                PollEvent::Stalled(status) => {
                    session.observer.on_stalled(status.progress);
                    self.bus.publish(KindwatchEvent::ProgressStalled {
                        session_id: session.id.clone(),
                        task_id: task_id.clone(),
                        progress: status.progress,
                    });
                    let report = self.check_existence(session).await?;
                    if report.verdict.confirms(session.expected_presence()) {
                        let message = format!(
                            "progress stalled at {}; {} confirmed by probes",
                            progress_label(status.progress),
                            effect_label(session.operation.kind)
                        );
                        self.log_override(session, &message);
                        return Ok(self.outcome(
                            session,
                            true,
                            OutcomePhase::Completed,
                            message,
                            true,
                            Some(task_id),
                            Some(&report),
                        ));
                    }
                    info!(
                        session_id = %session.id,
                        verdict = report.verdict.as_str(),
                        "early existence check inconclusive, polling continues"
                    );
                }
                PollEvent::Terminal(PollTerminal::Completed(status)) if status.success => {
                    return Ok(self.outcome(
                        session,
                        true,
                        OutcomePhase::Completed,
                        status.message,
                        false,
                        Some(task_id),
                        None,
                    ));
                }
                PollEvent::Terminal(PollTerminal::Completed(status))
                | PollEvent::Terminal(PollTerminal::Failed(status)) => {
                    let message = if status.message.is_empty() {
                        "backend reported the task as failed".to_string()
                    } else {
                        status.message
                    };
                    return self
                        .confirm_or_fail(session, OutcomePhase::Failed, message, Some(task_id))
                        .await;
                }
                PollEvent::Terminal(PollTerminal::UnknownTerminal { reason, .. }) => {
                    return self
                        .confirm_or_fail(session, OutcomePhase::Timeout, reason, Some(task_id))
                        .await;
                }
                PollEvent::TimedOut { error, .. } => {
                    return self
                        .confirm_or_fail(
                            session,
                            OutcomePhase::Timeout,
                            error.to_string(),
                            Some(task_id),
                        )
                        .await;
                }
                PollEvent::Cancelled => return Err(ReconcileError::Cancelled),
            }
        }
        Err(ReconcileError::Cancelled)
    }

    /// The primary channel said no (or nothing); ask the probes before
    /// reporting failure.
    async fn confirm_or_fail(
        &self,
        session: &Session,
        failure_phase: OutcomePhase,
        reported: String,
        task_id: Option<String>,
    ) -> Result<ReconciliationOutcome> {
        let report = self.check_existence(session).await?;
        if report.verdict.confirms(session.expected_presence()) {
            let message = format!(
                "{}; {} confirmed by probes",
                reported,
                effect_label(session.operation.kind)
            );
            self.log_override(session, &message);
            return Ok(self.outcome(
                session,
                true,
                OutcomePhase::Completed,
                message,
                true,
                task_id,
                Some(&report),
            ));
        }
        let message = if report.budget_exhausted {
            format!("{reported} (existence check ran out of time)")
        } else {
            reported
        };
        Ok(self.outcome(
            session,
            false,
            failure_phase,
            message,
            false,
            task_id,
            Some(&report),
        ))
    }

    async fn watch_for_effect(&self, session: &Session) -> Result<ReconciliationOutcome> {
        let target = WatchTarget::for_kind(session.operation.kind);
        let report = self
            .watcher()
            .run(
                &session.operation.target,
                target,
                session.cancel.clone(),
                &NoopWatchObserver,
            )
            .await;
        let verdict_report = OracleReport {
            resource: report.resource.clone(),
            verdict: report
                .last_verdict
                .unwrap_or(ExistenceVerdict::Inconclusive),
            results: report.last_probes.clone(),
            elapsed: Duration::from_millis(report.elapsed_ms),
            budget_exhausted: false,
        };
        match report.state {
            WatchState::Found => Ok(self.outcome(
                session,
                true,
                OutcomePhase::Completed,
                format!(
                    "{} confirmed after {} existence checks",
                    effect_label(session.operation.kind),
                    report.attempts
                ),
                false,
                None,
                Some(&verdict_report),
            )),
            WatchState::Cancelled => Err(ReconcileError::Cancelled),
            WatchState::Exhausted | WatchState::Watching => Ok(self.outcome(
                session,
                false,
                OutcomePhase::Timeout,
                format!(
                    "{} not confirmed after {} existence checks",
                    effect_label(session.operation.kind),
                    report.attempts
                ),
                false,
                None,
                Some(&verdict_report),
            )),
        }
    }

    async fn check_existence(&self, session: &Session) -> Result<OracleReport> {
        tokio::select! {
            biased;
            _ = session.cancel.cancelled() => Err(ReconcileError::Cancelled),
            report = self.oracle.check(&session.operation.target) => Ok(report),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn outcome(
        &self,
        session: &Session,
        success: bool,
        phase: OutcomePhase,
        message: String,
        overridden: bool,
        task_id: Option<String>,
        report: Option<&OracleReport>,
    ) -> ReconciliationOutcome {
        ReconciliationOutcome {
            session_id: session.id.clone(),
            kind: session.operation.kind,
            resource: session.operation.target.clone(),
            success,
            phase,
            message,
            overridden,
            task_id,
            verdict: report.map(|r| r.verdict),
            probes: report.map(|r| r.results.clone()).unwrap_or_default(),
        }
    }

    fn publish_submitted(&self, session: &Session, task_id: Option<String>) {
        self.bus.publish(KindwatchEvent::OperationSubmitted {
            session_id: session.id.clone(),
            kind: session.operation.kind,
            resource: session.operation.target.clone(),
            task_id,
        });
    }

    fn log_override(&self, session: &Session, message: &str) {
        emit_event(
            tracing::Level::WARN,
            ProcessKind::Embedded,
            ObservabilityEvent {
                event: "reconcile.override",
                component: "reconciler",
                session_id: Some(&session.id),
                operation: Some(session.operation.kind.as_str()),
                resource: Some(&session.operation.target),
                detail: Some(message),
                ..Default::default()
            },
        );
    }

    fn finish(&self, session: &Session, outcome: &ReconciliationOutcome) {
        let level = if outcome.success {
            tracing::Level::INFO
        } else {
            tracing::Level::WARN
        };
        emit_event(
            level,
            ProcessKind::Embedded,
            ObservabilityEvent {
                event: "reconcile.finished",
                component: "reconciler",
                session_id: Some(&session.id),
                task_id: outcome.task_id.as_deref(),
                operation: Some(outcome.kind.as_str()),
                resource: Some(&outcome.resource),
                status: Some(outcome.phase.as_str()),
                detail: Some(&outcome.message),
                ..Default::default()
            },
        );

        session.observer.on_complete(outcome);
        if outcome.success && outcome.kind == OperationKind::Delete {
            self.bus.publish(KindwatchEvent::ResourceRemoved {
                session_id: session.id.clone(),
                resource: outcome.resource.clone(),
            });
        }
        self.bus.publish(KindwatchEvent::OperationFinished {
            outcome: outcome.clone(),
        });
    }
}

/// A reconciliation running on its own task.
pub struct SessionHandle {
    session_id: String,
    cancel: CancellationToken,
    drop_guard: DropGuard,
    join: JoinHandle<Result<ReconciliationOutcome>>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Cancels the in-flight request and any pending timer.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn join(self) -> Result<ReconciliationOutcome> {
        let SessionHandle {
            drop_guard, join, ..
        } = self;
        let result = join.await;
        let _ = drop_guard.disarm();
        result.unwrap_or(Err(ReconcileError::Cancelled))
    }
}

fn effect_label(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Create => "cluster presence",
        OperationKind::Delete => "cluster removal",
        OperationKind::UpdateLimits => "cluster presence",
    }
}

fn progress_label(progress: Option<u8>) -> String {
    progress.map_or_else(|| "unknown".to_string(), |p| format!("{p}%"))
}
