use anyhow::Result;
use std::time::{Duration, Instant};

use super::cancel::CancelToken;

/// Enforces a minimum interval between encounter activations.
#[derive(Clone, Debug)]
pub struct CooldownTracker {
    window: Duration,
    last: Option<Instant>,
}

impl CooldownTracker {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn record(&mut self) {
        self.record_at(Instant::now());
    }

    pub fn record_at(&mut self, at: Instant) {
        self.last = Some(at);
    }

    pub fn last_recorded(&self) -> Option<Instant> {
        self.last
    }

    /// Time left in the window as of `now`; zero if nothing was recorded.
    pub fn remaining_at(&self, now: Instant) -> Duration {
        match self.last {
            Some(last) => self.window.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.remaining_at(Instant::now())
    }

    /// Sleeps out the rest of the window. Returns how long it waited.
    pub fn wait(&self, cancel: &CancelToken) -> Result<Duration> {
        let remaining = self.remaining();
        if !remaining.is_zero() {
            tracing::info!(
                remaining_secs = %format!("{:.1}", remaining.as_secs_f32()),
                "waiting for cooldown"
            );
            cancel.sleep(remaining)?;
        }
        Ok(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_recorded_means_no_wait() {
        let tracker = CooldownTracker::new(Duration::from_secs(60));
        assert_eq!(tracker.remaining(), Duration::ZERO);
        assert_eq!(tracker.wait(&CancelToken::new()).unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_remaining_counts_down() {
        let mut tracker = CooldownTracker::new(Duration::from_secs(60));
        let t0 = Instant::now();
        tracker.record_at(t0);
        assert_eq!(tracker.remaining_at(t0 + Duration::from_secs(45)), Duration::from_secs(15));
        assert_eq!(tracker.remaining_at(t0 + Duration::from_secs(75)), Duration::ZERO);
    }

    #[test]
    fn test_wait_is_cancellable() {
        let mut tracker = CooldownTracker::new(Duration::from_secs(60));
        tracker.record();
        let cancel = CancelToken::new();
        cancel.cancel();
        let started = Instant::now();
        assert!(tracker.wait(&cancel).is_err());
        assert!(started.elapsed() < Duration::from_millis(200));
    }
}
