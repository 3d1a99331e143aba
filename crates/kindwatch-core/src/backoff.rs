use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Delay policy between poll attempts: flat for the first few attempts,
/// geometric afterwards, capped, plus uniform jitter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    /// Attempts that keep the base interval before growth starts.
    pub linear_attempts: u32,
    pub multiplier: f64,
    pub max_interval_ms: u64,
    pub max_jitter_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: 3_000,
            linear_attempts: 5,
            multiplier: 1.3,
            max_interval_ms: 15_000,
            max_jitter_ms: 1_000,
        }
    }
}

impl BackoffPolicy {
    pub fn with_base(base_ms: u64) -> Self {
        Self {
            base_ms,
            ..Self::default()
        }
    }

    /// Delay after `attempt` completed attempts (1-based), without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let cap = self.max_interval_ms.max(1);
        let base = self.base_ms.min(cap);
        if attempt <= self.linear_attempts {
            return Duration::from_millis(base);
        }
        let steps = (attempt - self.linear_attempts).min(64) as i32;
        let factor = self.multiplier.max(1.0).powi(steps);
        let grown = (base as f64 * factor).min(cap as f64);
        Duration::from_millis(grown.round() as u64)
    }

    pub fn delay_with_jitter(&self, attempt: u32, jitter: Duration) -> Duration {
        let jitter = jitter.min(Duration::from_millis(self.max_jitter_ms));
        self.base_delay(attempt) + jitter
    }

    /// Delay with a fresh random jitter in `[0, max_jitter_ms]`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let jitter_ms = if self.max_jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.max_jitter_ms)
        };
        self.delay_with_jitter(attempt, Duration::from_millis(jitter_ms))
    }

    /// Largest delay this policy can ever produce.
    pub fn ceiling(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms.max(1) + self.max_jitter_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_then_geometric_growth() {
        let policy = BackoffPolicy::with_base(2_000);
        for attempt in 1..=5 {
            assert_eq!(policy.base_delay(attempt), Duration::from_millis(2_000));
        }
        assert_eq!(policy.base_delay(6), Duration::from_millis(2_600));
        assert_eq!(policy.base_delay(7), Duration::from_millis(3_380));
    }

    #[test]
    fn delays_are_non_decreasing_and_capped() {
        let policy = BackoffPolicy::default();
        let mut previous = Duration::ZERO;
        for attempt in 1..=200 {
            let delay = policy.base_delay(attempt);
            assert!(delay >= previous, "attempt {attempt} shrank");
            assert!(delay <= Duration::from_millis(policy.max_interval_ms));
            previous = delay;
        }
        assert_eq!(previous, Duration::from_millis(15_000));
    }

    #[test]
    fn jitter_is_bounded() {
        let policy = BackoffPolicy::default();
        for attempt in 1..=50 {
            let delay = policy.next_delay(attempt);
            assert!(delay >= policy.base_delay(attempt));
            assert!(delay <= policy.ceiling());
        }
        assert_eq!(
            policy.delay_with_jitter(1, Duration::from_secs(30)),
            Duration::from_millis(4_000)
        );
    }

    #[test]
    fn base_larger_than_cap_is_clamped() {
        let policy = BackoffPolicy {
            base_ms: 60_000,
            max_interval_ms: 10_000,
            max_jitter_ms: 0,
            ..BackoffPolicy::default()
        };
        assert_eq!(policy.next_delay(1), Duration::from_millis(10_000));
        assert_eq!(policy.next_delay(40), Duration::from_millis(10_000));
    }
}
