use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use kindwatch_observability::{emit_event, ObservabilityEvent, ProcessKind};
use kindwatch_types::{TaskPhase, TaskStatus};

use crate::config::PollerProfile;
use crate::error::{PollError, TransportError};
use crate::normalize::{classify_status_text, normalize_task_status, StatusText};
use crate::routes::BackendRoutes;
use crate::stall::StallTracker;
use crate::transport::{request_with_deadline, Transport, TransportRequest};

/// How a polling session ended from the task channel's point of view.
#[derive(Debug, Clone)]
pub enum PollTerminal {
    Completed(TaskStatus),
    Failed(TaskStatus),
    /// The backend stopped knowing about the task.
    UnknownTerminal {
        last: Option<TaskStatus>,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub enum PollEvent {
    /// The normalized status differs from the previous tick.
    Updated(TaskStatus),
    /// Progress stopped moving. Polling can continue afterwards.
    Stalled(TaskStatus),
    Terminal(PollTerminal),
    TimedOut {
        error: PollError,
        last: Option<TaskStatus>,
    },
    Cancelled,
}

/// Sequential status polling for one task id.
///
/// Each call to [`TaskPoller::next_event`] drives ticks until something
/// worth reporting happens. Ticks never overlap: a request resolves (or
/// times out) before the backoff delay for the next one starts.
pub struct TaskPoller {
    transport: Arc<dyn Transport>,
    path: String,
    task_id: String,
    profile: PollerProfile,
    not_found_threshold: u32,
    cancel: CancellationToken,

    started: Instant,
    attempts: u32,
    not_found_streak: u32,
    last_status: Option<TaskStatus>,
    last_error: Option<TransportError>,
    stall: StallTracker,
    queued: VecDeque<PollEvent>,
    finished: bool,
}

impl TaskPoller {
    pub fn new(
        transport: Arc<dyn Transport>,
        routes: &BackendRoutes,
        task_id: impl Into<String>,
        profile: PollerProfile,
        stall_threshold: u32,
        not_found_threshold: u32,
        cancel: CancellationToken,
    ) -> Self {
        let task_id = task_id.into();
        Self {
            transport,
            path: routes.task_status_path(&task_id),
            task_id,
            profile,
            not_found_threshold: not_found_threshold.max(1),
            cancel,
            started: Instant::now(),
            attempts: 0,
            not_found_streak: 0,
            last_status: None,
            last_error: None,
            stall: StallTracker::new(stall_threshold),
            queued: VecDeque::new(),
            finished: false,
        }
    }

    /// Returns `None` once a terminal, timeout or cancellation event has
    /// been handed out.
    pub async fn next_event(&mut self) -> Option<PollEvent> {
        if let Some(event) = self.queued.pop_front() {
            return Some(event);
        }
        if self.finished {
            return None;
        }

        loop {
            if self.cancel.is_cancelled() {
                return Some(self.finish(PollEvent::Cancelled));
            }
            if let Some(timeout) = self.budget_exhausted() {
                return Some(self.finish(timeout));
            }

            if self.attempts > 0 {
                let remaining = self.remaining_wall_clock();
                let delay = self.profile.backoff.next_delay(self.attempts).min(remaining);
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Some(self.finish(PollEvent::Cancelled)),
                    _ = tokio::time::sleep(delay) => {}
                }
                if let Some(timeout) = self.budget_exhausted() {
                    return Some(self.finish(timeout));
                }
            }

            self.attempts += 1;
            let attempt_timeout = self
                .profile
                .attempt_timeout()
                .min(self.remaining_wall_clock().max(Duration::from_millis(1)));
            let request = TransportRequest::get(self.path.clone(), attempt_timeout);
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Some(self.finish(PollEvent::Cancelled)),
                result = request_with_deadline(self.transport.as_ref(), request) => result,
            };

            match result {
                Ok(raw) => {
                    if self.handle_payload(raw) {
                        if let Some(event) = self.queued.pop_front() {
                            return Some(event);
                        }
                    }
                }
                Err(err) => {
                    debug!(
                        task_id = %self.task_id,
                        attempt = self.attempts,
                        "task status lookup failed, retrying: {}",
                        err
                    );
                    let missing = err.is_not_found();
                    self.last_error = Some(err);
                    if missing && self.count_not_found() {
                        return self.queued.pop_front();
                    }
                }
            }
        }
    }

    /// Queues whatever this payload is worth reporting; returns whether
    /// anything was queued.
    fn handle_payload(&mut self, raw: serde_json::Value) -> bool {
        let status = normalize_task_status(&raw);
        self.last_error = None;

        let backend_missing = status
            .backend_state
            .as_deref()
            .map(classify_status_text)
            == Some(StatusText::NotFound);
        if backend_missing {
            return self.count_not_found();
        }
        self.not_found_streak = 0;

        let changed = self
            .last_status
            .as_ref()
            .map_or(true, |previous| !previous.same_observation(&status));
        self.last_status = Some(status.clone());
        if changed {
            self.queued.push_back(PollEvent::Updated(status.clone()));
        }

        match status.phase {
            TaskPhase::Completed => {
                self.queued
                    .push_back(PollEvent::Terminal(PollTerminal::Completed(status)));
                self.finished = true;
            }
            TaskPhase::Failed => {
                self.queued
                    .push_back(PollEvent::Terminal(PollTerminal::Failed(status)));
                self.finished = true;
            }
            TaskPhase::Pending | TaskPhase::Running | TaskPhase::Unknown => {
                if self.stall.observe(status.progress) {
                    let detail = format!(
                        "progress={:?} repeats={}",
                        status.progress,
                        self.stall.repeats()
                    );
                    emit_event(
                        tracing::Level::WARN,
                        ProcessKind::Embedded,
                        ObservabilityEvent {
                            event: "poller.stalled",
                            component: "poller",
                            task_id: Some(&self.task_id),
                            status: Some(status.phase.as_str()),
                            detail: Some(&detail),
                            ..Default::default()
                        },
                    );
                    self.queued.push_back(PollEvent::Stalled(status));
                }
            }
        }
        !self.queued.is_empty()
    }

    /// Returns true when the streak reached the threshold and a terminal
    /// event was queued.
    fn count_not_found(&mut self) -> bool {
        self.not_found_streak += 1;
        if self.not_found_streak < self.not_found_threshold {
            return false;
        }
        let reason = format!(
            "task {} not found by the backend on {} consecutive lookups",
            self.task_id, self.not_found_streak
        );
        self.queued
            .push_back(PollEvent::Terminal(PollTerminal::UnknownTerminal {
                last: self.last_status.clone(),
                reason,
            }));
        self.finished = true;
        true
    }

    fn remaining_wall_clock(&self) -> Duration {
        self.profile
            .wall_clock()
            .saturating_sub(self.started.elapsed())
    }

    fn budget_exhausted(&self) -> Option<PollEvent> {
        let elapsed = self.started.elapsed();
        if self.attempts < self.profile.max_attempts && elapsed < self.profile.wall_clock() {
            return None;
        }
        Some(PollEvent::TimedOut {
            error: PollError::TaskPollingTimeout {
                task_id: self.task_id.clone(),
                attempts: self.attempts,
                elapsed_ms: elapsed.as_millis() as u64,
                last_error: self.last_error.as_ref().map(ToString::to_string),
            },
            last: self.last_status.clone(),
        })
    }

    fn finish(&mut self, event: PollEvent) -> PollEvent {
        self.finished = true;
        self.queued.clear();
        event
    }
}
