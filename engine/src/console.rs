use std::io::Write;

use kindwatch_core::{OracleReport, ReconcileError, ReconcileObserver, WatchObserver, WatchReport};
use kindwatch_types::{ReconciliationOutcome, TaskStatus};

/// Prints session progress to stderr; stdout is kept for the final result.
pub struct ConsoleObserver {
    quiet: bool,
}

impl ConsoleObserver {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    fn line(&self, text: &str) {
        if self.quiet {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{text}");
    }
}

impl ReconcileObserver for ConsoleObserver {
    fn on_update(&self, status: &TaskStatus) {
        let progress = status
            .progress
            .map(|p| format!(" {p:>3}%"))
            .unwrap_or_default();
        let message = if status.message.is_empty() {
            String::new()
        } else {
            format!("  {}", status.message)
        };
        self.line(&format!("[task] {}{}{}", status.phase.as_str(), progress, message));
    }

    fn on_stalled(&self, progress: Option<u8>) {
        let at = progress.map(|p| format!("{p}%")).unwrap_or_else(|| "?".to_string());
        self.line(&format!("[task] progress stalled at {at}, checking cluster state"));
    }

    fn on_complete(&self, outcome: &ReconciliationOutcome) {
        if outcome.overridden {
            self.line("[task] backend report overridden by observed cluster state");
        }
    }

    fn on_error(&self, error: &ReconcileError) {
        self.line(&format!("[error] {error}"));
    }
}

impl WatchObserver for ConsoleObserver {
    fn on_tick(&self, attempt: u32, report: &OracleReport) {
        self.line(&format!(
            "[watch] check {attempt}: {} ({} ms)",
            report.verdict.as_str(),
            report.elapsed.as_millis()
        ));
    }

    fn on_found(&self, report: &WatchReport) {
        self.line(&format!("[watch] target reached after {} checks", report.attempts));
    }

    fn on_exhausted(&self, report: &WatchReport) {
        self.line(&format!("[watch] gave up after {} checks", report.attempts));
    }
}
