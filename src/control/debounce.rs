//! Confirming noisy boolean signals.

use std::time::{Duration, Instant};

/// Confirms a signal once it has read true continuously for `stable_for`.
/// Any false reading starts the interval over.
#[derive(Clone, Debug)]
pub struct StabilityDebouncer {
    stable_for: Duration,
    first_true_at: Option<Instant>,
}

impl StabilityDebouncer {
    pub fn new(stable_for: Duration) -> Self {
        Self {
            stable_for,
            first_true_at: None,
        }
    }

    pub fn observe(&mut self, now: Instant, value: bool) -> bool {
        if !value {
            self.first_true_at = None;
            return false;
        }
        let since = *self.first_true_at.get_or_insert(now);
        now.saturating_duration_since(since) >= self.stable_for
    }

    pub fn confirm(&mut self, check: impl FnOnce() -> bool) -> bool {
        let value = check();
        self.observe(Instant::now(), value)
    }

    pub fn reset(&mut self) {
        self.first_true_at = None;
    }
}

/// Confirms a signal after `required` positive reads in a row.
#[derive(Clone, Debug)]
pub struct ConsecutiveConfirm {
    required: u32,
    count: u32,
}

impl ConsecutiveConfirm {
    pub fn new(required: u32) -> Self {
        Self { required, count: 0 }
    }

    pub fn observe(&mut self, value: bool) -> bool {
        if value {
            self.count = self.count.saturating_add(1);
        } else {
            self.count = 0;
        }
        self.count >= self.required
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_true_reads_confirm_after_interval() {
        let mut d = StabilityDebouncer::new(Duration::from_millis(500));
        let t0 = Instant::now();
        assert!(!d.observe(t0, true));
        assert!(!d.observe(t0 + Duration::from_millis(300), true));
        assert!(d.observe(t0 + Duration::from_millis(500), true));
    }

    #[test]
    fn test_false_read_restarts_interval() {
        let mut d = StabilityDebouncer::new(Duration::from_millis(500));
        let t0 = Instant::now();
        d.observe(t0, true);
        assert!(!d.observe(t0 + Duration::from_millis(400), false));
        assert!(!d.observe(t0 + Duration::from_millis(600), true));
        assert!(!d.observe(t0 + Duration::from_millis(1000), true));
        assert!(d.observe(t0 + Duration::from_millis(1100), true));
    }

    #[test]
    fn test_zero_interval_confirms_immediately() {
        let mut d = StabilityDebouncer::new(Duration::ZERO);
        assert!(d.confirm(|| true));
        assert!(!d.confirm(|| false));
    }

    #[test]
    fn test_consecutive_confirm() {
        let mut c = ConsecutiveConfirm::new(2);
        assert!(!c.observe(true));
        assert!(!c.observe(false));
        assert!(!c.observe(true));
        assert!(c.observe(true));
        assert_eq!(c.count(), 2);
    }
}
