/// Per-session stalled-progress bookkeeping.
///
/// A stall episode starts when the same progress value has been seen on
/// `threshold` consecutive in-progress ticks (the first of them counts as
/// the baseline). The signal fires once per episode; a different progress
/// value ends the episode.
#[derive(Debug, Clone)]
pub struct StallTracker {
    threshold: u32,
    last_progress: Option<u8>,
    repeats: u32,
    raised: bool,
}

impl StallTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(2),
            last_progress: None,
            repeats: 0,
            raised: false,
        }
    }

    /// Records one in-progress reading. Returns `true` only on the tick that
    /// opens a stall episode.
    pub fn observe(&mut self, progress: Option<u8>) -> bool {
        // Without a progress figure there is nothing to compare.
        let Some(progress) = progress else {
            return false;
        };

        if self.last_progress == Some(progress) {
            self.repeats = self.repeats.saturating_add(1);
        } else {
            self.last_progress = Some(progress);
            self.repeats = 1;
            self.raised = false;
        }

        if self.repeats >= self.threshold && !self.raised {
            self.raised = true;
            return true;
        }
        false
    }

    pub fn repeats(&self) -> u32 {
        self.repeats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_on_the_threshold_tick() {
        let mut tracker = StallTracker::new(5);
        let fired: Vec<bool> = (0..5).map(|_| tracker.observe(Some(10))).collect();
        assert_eq!(fired, vec![false, false, false, false, true]);
        assert_eq!(tracker.repeats(), 5);
    }

    #[test]
    fn fires_once_per_episode() {
        let mut tracker = StallTracker::new(3);
        let fired = (0..10).filter(|_| tracker.observe(Some(50))).count();
        assert_eq!(fired, 1);

        assert!(!tracker.observe(Some(60)));
        assert_eq!(tracker.repeats(), 1);
        assert!(!tracker.observe(Some(60)));
        assert!(tracker.observe(Some(60)));
    }

    #[test]
    fn missing_progress_is_ignored() {
        let mut tracker = StallTracker::new(2);
        for _ in 0..10 {
            assert!(!tracker.observe(None));
        }
        assert_eq!(tracker.repeats(), 0);
    }

    #[test]
    fn returning_to_an_old_value_starts_a_new_episode() {
        let mut tracker = StallTracker::new(2);
        tracker.observe(Some(1));
        assert!(tracker.observe(Some(1)));
        assert!(!tracker.observe(Some(2)));
        assert!(!tracker.observe(Some(1)));
        assert!(tracker.observe(Some(1)));
    }
}
