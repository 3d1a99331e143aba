use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::Instant;
use tracing::{debug, warn};

use kindwatch_observability::{emit_event, ObservabilityEvent, ProcessKind};
use kindwatch_types::{ExistenceVerdict, ProbeResult};

use crate::config::{OracleMode, OracleSettings};
use crate::error::TransportError;

/// One independent, read-only "does this resource exist" check.
#[async_trait]
pub trait Probe: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(false)` means the probe looked and did not see the resource.
    /// Errors mean the probe could not tell.
    async fn exists(&self, resource: &str, timeout: Duration) -> Result<bool, TransportError>;
}

#[derive(Debug, Clone)]
pub struct OracleReport {
    pub resource: String,
    pub verdict: ExistenceVerdict,
    pub results: Vec<ProbeResult>,
    pub elapsed: Duration,
    /// The overall budget ran out before every probe had answered.
    pub budget_exhausted: bool,
}

impl OracleReport {
    pub fn found(&self) -> bool {
        self.verdict == ExistenceVerdict::Found
    }
}

/// Combines several unreliable probes into one existence verdict with
/// logical OR and early exit on the first positive.
pub struct ExistenceOracle {
    probes: Vec<Arc<dyn Probe>>,
    probe_timeout: Duration,
    overall_budget: Duration,
    mode: OracleMode,
}

impl ExistenceOracle {
    pub fn new(probes: Vec<Arc<dyn Probe>>, settings: &OracleSettings) -> Self {
        Self {
            probes,
            probe_timeout: Duration::from_millis(settings.probe_timeout_ms.max(1)),
            overall_budget: Duration::from_millis(settings.overall_budget_ms.max(1)),
            mode: settings.mode,
        }
    }

    pub async fn check(&self, resource: &str) -> OracleReport {
        let started = Instant::now();
        let deadline = started + self.overall_budget;
        let mut results: Vec<ProbeResult> = Vec::with_capacity(self.probes.len());

        let finished = match self.mode {
            OracleMode::Sequential => {
                tokio::time::timeout_at(
                    deadline,
                    self.run_sequential(resource, deadline, &mut results),
                )
                .await
            }
            OracleMode::Concurrent => {
                tokio::time::timeout_at(deadline, self.run_concurrent(resource, &mut results))
                    .await
            }
        };
        let budget_exhausted = finished.is_err();

        let verdict = reduce(&results);
        let elapsed = started.elapsed();
        let detail = format!(
            "probes_run={} of {} elapsed_ms={} budget_exhausted={}",
            results.len(),
            self.probes.len(),
            elapsed.as_millis(),
            budget_exhausted
        );
        emit_event(
            tracing::Level::INFO,
            ProcessKind::Embedded,
            ObservabilityEvent {
                event: "oracle.verdict",
                component: "oracle",
                resource: Some(resource),
                status: Some(verdict.as_str()),
                detail: Some(&detail),
                ..Default::default()
            },
        );

        OracleReport {
            resource: resource.to_string(),
            verdict,
            results,
            elapsed,
            budget_exhausted,
        }
    }

    async fn run_sequential(
        &self,
        resource: &str,
        deadline: Instant,
        results: &mut Vec<ProbeResult>,
    ) {
        for probe in &self.probes {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            let timeout = self.probe_timeout.min(remaining);
            let result = run_probe(probe.as_ref(), resource, timeout).await;
            let found = result.found;
            results.push(result);
            if found {
                return;
            }
        }
    }

    async fn run_concurrent(&self, resource: &str, results: &mut Vec<ProbeResult>) {
        let mut pending: FuturesUnordered<_> = self
            .probes
            .iter()
            .map(|probe| run_probe(probe.as_ref(), resource, self.probe_timeout))
            .collect();

        while let Some(result) = pending.next().await {
            let found = result.found;
            results.push(result);
            if found {
                // Dropping `pending` cancels the slower probes.
                return;
            }
        }
    }
}

async fn run_probe(probe: &dyn Probe, resource: &str, timeout: Duration) -> ProbeResult {
    let started = Instant::now();
    let outcome = tokio::time::timeout(timeout, probe.exists(resource, timeout)).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let (found, error) = match outcome {
        Ok(Ok(found)) => (found, None),
        Ok(Err(err)) => {
            warn!(probe = probe.name(), resource, "existence probe failed: {}", err);
            (false, Some(err.to_string()))
        }
        Err(_) => {
            warn!(
                probe = probe.name(),
                resource,
                "existence probe timed out after {}ms",
                timeout.as_millis()
            );
            (false, Some(format!("timed out after {}ms", timeout.as_millis())))
        }
    };
    debug!(probe = probe.name(), resource, found, elapsed_ms, "probe finished");

    ProbeResult {
        probe: probe.name().to_string(),
        found,
        error,
        elapsed_ms,
    }
}

/// OR over all answers; a clean negative from at least one probe is needed
/// to call the resource absent.
pub fn reduce(results: &[ProbeResult]) -> ExistenceVerdict {
    if results.iter().any(|r| r.found) {
        ExistenceVerdict::Found
    } else if results.iter().any(ProbeResult::answered) {
        ExistenceVerdict::NotFound
    } else {
        ExistenceVerdict::Inconclusive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behaviour {
        Found,
        Missing,
        Fail,
        Hang,
        SlowFound(Duration),
    }

    struct FakeProbe {
        name: String,
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl FakeProbe {
        fn new(name: &str, behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Probe for FakeProbe {
        fn name(&self) -> &str {
            &self.name
        }

        async fn exists(
            &self,
            _resource: &str,
            _timeout: Duration,
        ) -> Result<bool, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Found => Ok(true),
                Behaviour::Missing => Ok(false),
                Behaviour::Fail => Err(TransportError::Http {
                    url: format!("/{}", self.name),
                    status: 500,
                    body: "boom".to_string(),
                }),
                Behaviour::Hang => {
                    std::future::pending::<()>().await;
                    Ok(false)
                }
                Behaviour::SlowFound(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(true)
                }
            }
        }
    }

    fn settings(mode: OracleMode) -> OracleSettings {
        OracleSettings {
            probe_timeout_ms: 8_000,
            overall_budget_ms: 20_000,
            mode,
            ..OracleSettings::default()
        }
    }

    fn oracle(probes: Vec<Arc<FakeProbe>>, mode: OracleMode) -> ExistenceOracle {
        let probes = probes
            .into_iter()
            .map(|p| p as Arc<dyn Probe>)
            .collect::<Vec<_>>();
        ExistenceOracle::new(probes, &settings(mode))
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_first_positive() {
        let first = FakeProbe::new("status", Behaviour::Missing);
        let second = FakeProbe::new("list", Behaviour::Found);
        let third = FakeProbe::new("nodes", Behaviour::Found);
        let oracle = oracle(
            vec![first.clone(), second.clone(), third.clone()],
            OracleMode::Sequential,
        );

        let report = oracle.check("demo").await;

        assert_eq!(report.verdict, ExistenceVerdict::Found);
        assert_eq!(report.results.len(), 2);
        assert_eq!(third.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_probe_is_skipped_not_counted_as_absent() {
        let oracle = oracle(
            vec![
                FakeProbe::new("status", Behaviour::Fail),
                FakeProbe::new("list", Behaviour::Found),
            ],
            OracleMode::Sequential,
        );
        let report = oracle.check("demo").await;
        assert!(report.found());
        assert!(report.results[0].error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn all_failures_are_inconclusive() {
        let oracle = oracle(
            vec![
                FakeProbe::new("status", Behaviour::Fail),
                FakeProbe::new("list", Behaviour::Fail),
            ],
            OracleMode::Sequential,
        );
        let report = oracle.check("demo").await;
        assert_eq!(report.verdict, ExistenceVerdict::Inconclusive);
        assert!(!report.budget_exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn clean_negative_means_not_found() {
        let oracle = oracle(
            vec![
                FakeProbe::new("status", Behaviour::Fail),
                FakeProbe::new("details", Behaviour::Missing),
            ],
            OracleMode::Sequential,
        );
        assert_eq!(oracle.check("demo").await.verdict, ExistenceVerdict::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_probes_never_exceed_overall_budget() {
        let probes = (0..10)
            .map(|i| FakeProbe::new(&format!("hang-{i}"), Behaviour::Hang))
            .collect::<Vec<_>>();
        let oracle = oracle(probes, OracleMode::Sequential);

        let started = Instant::now();
        let report = oracle.check("demo").await;

        assert!(started.elapsed() <= Duration::from_millis(20_000));
        assert!(report.budget_exhausted);
        assert_eq!(report.verdict, ExistenceVerdict::Inconclusive);
        // 8s + 8s + the 4s left of the budget
        assert_eq!(report.results.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_mode_takes_fastest_positive() {
        let slow = FakeProbe::new("slow", Behaviour::SlowFound(Duration::from_secs(6)));
        let fast = FakeProbe::new("fast", Behaviour::SlowFound(Duration::from_secs(1)));
        let oracle = oracle(
            vec![slow, fast, FakeProbe::new("hang", Behaviour::Hang)],
            OracleMode::Concurrent,
        );

        let started = Instant::now();
        let report = oracle.check("demo").await;

        assert!(report.found());
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].probe, "fast");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_mode_is_bounded_by_budget() {
        let mut settings = settings(OracleMode::Concurrent);
        settings.probe_timeout_ms = 60_000;
        settings.overall_budget_ms = 5_000;
        let oracle = ExistenceOracle::new(
            vec![FakeProbe::new("hang", Behaviour::Hang) as Arc<dyn Probe>],
            &settings,
        );
        let started = Instant::now();
        let report = oracle.check("demo").await;
        assert!(started.elapsed() <= Duration::from_millis(5_000));
        assert!(report.budget_exhausted);
        assert!(report.results.is_empty());
    }

    #[test]
    fn reduce_prefers_any_positive() {
        let result = |found, error: Option<&str>| ProbeResult {
            probe: "p".to_string(),
            found,
            error: error.map(str::to_string),
            elapsed_ms: 0,
        };
        assert_eq!(reduce(&[]), ExistenceVerdict::Inconclusive);
        assert_eq!(
            reduce(&[result(false, None), result(true, None)]),
            ExistenceVerdict::Found
        );
        assert_eq!(
            reduce(&[result(false, Some("timeout"))]),
            ExistenceVerdict::Inconclusive
        );
    }
}
