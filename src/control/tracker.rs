//! Keeping a lock on one target across noisy detections.
//!
//! The tracker prefers the label it locked onto and, among several hits, the
//! one nearest to where the target was last seen. Consecutive misses trigger
//! one bounded reacquisition sweep before the target is declared lost.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::cancel::CancelToken;
use crate::vision::{DetectionBox, Perception, Region};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Candidate labels in priority order.
    pub labels: Vec<String>,
    /// Threshold when querying the locked label.
    pub locked_threshold: f32,
    /// Threshold when scanning all labels.
    pub scan_threshold: f32,
    /// Consecutive misses before a reacquisition sweep.
    pub miss_limit: u32,
    pub reacquire_attempts: u32,
    pub reacquire_interval_ms: u64,
    /// Poll interval for `wait_for_any`.
    pub poll_interval_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            labels: (1..=5).map(|i| format!("chest{}", i)).collect(),
            locked_threshold: 0.6,
            scan_threshold: 0.6,
            miss_limit: 5,
            reacquire_attempts: 10,
            reacquire_interval_ms: 500,
            poll_interval_ms: 500,
        }
    }
}

impl TrackerConfig {
    pub fn label_refs(&self) -> Vec<&str> {
        self.labels.iter().map(String::as_str).collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackedTarget {
    pub locked_label: Option<String>,
    pub last_known_center: Option<(i32, i32)>,
    pub miss_count: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TrackOutcome {
    Found(DetectionBox),
    /// Found again by the reacquisition sweep.
    Reacquired(DetectionBox),
    Missed { misses: u32 },
    Lost,
}

impl TrackOutcome {
    pub fn detection(&self) -> Option<&DetectionBox> {
        match self {
            TrackOutcome::Found(b) | TrackOutcome::Reacquired(b) => Some(b),
            _ => None,
        }
    }
}

/// Picks the box nearest `anchor`; the first one wins ties.
pub fn nearest<'a>(
    boxes: &'a [DetectionBox],
    anchor: Option<(i32, i32)>,
) -> Option<&'a DetectionBox> {
    match anchor {
        Some(point) => boxes.iter().fold(None, |best: Option<&DetectionBox>, b| match best {
            Some(current) if current.manhattan_to(point) <= b.manhattan_to(point) => Some(current),
            _ => Some(b),
        }),
        None => boxes.first(),
    }
}

/// Queries `labels` one at a time in priority order and returns the best hit
/// of the first label that matches anything.
pub fn scan_in_order(
    perception: &dyn Perception,
    labels: &[&str],
    region: Option<Region>,
    threshold: f32,
) -> Result<Option<DetectionBox>> {
    for label in labels {
        let hits = perception.detect(&[*label], region, threshold)?;
        if let Some(hit) = hits.into_iter().next() {
            return Ok(Some(hit));
        }
    }
    Ok(None)
}

pub struct TargetTracker<'a> {
    perception: &'a dyn Perception,
    cancel: &'a CancelToken,
    config: &'a TrackerConfig,
    target: TrackedTarget,
}

impl<'a> TargetTracker<'a> {
    pub fn new(
        perception: &'a dyn Perception,
        cancel: &'a CancelToken,
        config: &'a TrackerConfig,
    ) -> Self {
        Self {
            perception,
            cancel,
            config,
            target: TrackedTarget::default(),
        }
    }

    /// Starts from a box found elsewhere (monitoring or search).
    pub fn with_target(
        perception: &'a dyn Perception,
        cancel: &'a CancelToken,
        config: &'a TrackerConfig,
        found: &DetectionBox,
    ) -> Self {
        let mut tracker = Self::new(perception, cancel, config);
        tracker.lock(found);
        tracker
    }

    pub fn target(&self) -> &TrackedTarget {
        &self.target
    }

    fn lock(&mut self, found: &DetectionBox) {
        self.target.locked_label = Some(found.label.clone());
        self.target.last_known_center = Some(found.center());
        self.target.miss_count = 0;
    }

    /// One detection pass: locked label first, then every label in order.
    /// Updates the lock on success; leaves the miss count alone.
    pub fn acquire(&mut self, region: Option<Region>) -> Result<Option<DetectionBox>> {
        let anchor = self.target.last_known_center;

        if let Some(label) = self.target.locked_label.clone() {
            let hits = self
                .perception
                .detect(&[label.as_str()], region, self.config.locked_threshold)?;
            if let Some(hit) = nearest(&hits, anchor).cloned() {
                self.lock(&hit);
                return Ok(Some(hit));
            }
        }

        for label in &self.config.labels {
            let hits = self
                .perception
                .detect(&[label.as_str()], region, self.config.scan_threshold)?;
            if let Some(hit) = nearest(&hits, anchor).cloned() {
                tracing::debug!(label = %label, center = ?hit.center(), "locked target label");
                self.lock(&hit);
                return Ok(Some(hit));
            }
        }

        Ok(None)
    }

    /// Detects the target, running the reacquisition sweep once the miss
    /// limit is reached.
    pub fn track(&mut self, region: Option<Region>) -> Result<TrackOutcome> {
        if let Some(hit) = self.acquire(region)? {
            return Ok(TrackOutcome::Found(hit));
        }

        self.target.miss_count += 1;
        if self.target.miss_count < self.config.miss_limit {
            return Ok(TrackOutcome::Missed {
                misses: self.target.miss_count,
            });
        }

        tracing::debug!(misses = self.target.miss_count, "target missing, reacquiring");
        let interval = Duration::from_millis(self.config.reacquire_interval_ms);
        for attempt in 0..self.config.reacquire_attempts {
            if attempt > 0 {
                self.cancel.sleep(interval)?;
            }
            if let Some(hit) = self.acquire(region)? {
                tracing::debug!(attempt, "target reacquired");
                return Ok(TrackOutcome::Reacquired(hit));
            }
        }

        tracing::info!("could not reacquire target");
        Ok(TrackOutcome::Lost)
    }

    /// Polls every label on the full frame until one shows up or `timeout` passes.
    pub fn wait_for_any(&mut self, timeout: Duration) -> Result<Option<DetectionBox>> {
        let deadline = Instant::now() + timeout;
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        let labels = self.config.label_refs();

        loop {
            self.cancel.check()?;
            let hit = scan_in_order(self.perception, &labels, None, self.config.scan_threshold)?;
            if let Some(hit) = hit {
                tracing::info!(label = %hit.label, center = ?hit.center(), "target appeared");
                self.lock(&hit);
                return Ok(Some(hit));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            self.cancel.sleep(interval.min(deadline - now))?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubPerception;

    fn config() -> TrackerConfig {
        TrackerConfig {
            reacquire_interval_ms: 0,
            poll_interval_ms: 10,
            ..TrackerConfig::default()
        }
    }

    #[test]
    fn test_nearest_prefers_last_center_and_first_on_ties() {
        let boxes = vec![
            DetectionBox::new("chest1", 100, 100, 10, 10, 0.9),
            DetectionBox::new("chest1", 10, 10, 10, 10, 0.8),
            DetectionBox::new("chest1", 20, 10, 10, 10, 0.8),
        ];
        assert_eq!(nearest(&boxes, Some((15, 15))).unwrap().x, 10);
        // (20, 15) is 5 away from both the second and third box
        assert_eq!(nearest(&boxes, Some((20, 15))).unwrap().x, 10);
        assert_eq!(nearest(&boxes, None).unwrap().x, 100);
    }

    #[test]
    fn test_locked_label_queried_first_and_nearest_chosen() {
        let perception = StubPerception::new();
        perception.set_detections(
            "chest2",
            vec![
                DetectionBox::new("chest2", 500, 500, 20, 20, 0.95),
                DetectionBox::new("chest2", 90, 90, 20, 20, 0.85),
            ],
        );
        perception.set_detections("chest1", vec![DetectionBox::new("chest1", 0, 0, 20, 20, 0.9)]);
        let cancel = CancelToken::new();
        let config = config();
        let seed = DetectionBox::new("chest2", 95, 95, 20, 20, 0.9);
        let mut tracker = TargetTracker::with_target(&perception, &cancel, &config, &seed);

        let outcome = tracker.track(None).unwrap();
        assert_eq!(outcome.detection().unwrap().x, 90);
        assert_eq!(perception.queried_labels()[0], vec!["chest2".to_string()]);
        assert_eq!(tracker.target().last_known_center, Some((100, 100)));
    }

    #[test]
    fn test_scans_labels_in_priority_order() {
        let perception = StubPerception::new();
        perception.set_detections("chest3", vec![DetectionBox::new("chest3", 5, 5, 4, 4, 0.7)]);
        perception.set_detections("chest4", vec![DetectionBox::new("chest4", 50, 5, 4, 4, 0.9)]);
        let cancel = CancelToken::new();
        let config = config();
        let mut tracker = TargetTracker::new(&perception, &cancel, &config);

        let hit = tracker.acquire(None).unwrap().unwrap();
        assert_eq!(hit.label, "chest3");
        assert_eq!(tracker.target().locked_label.as_deref(), Some("chest3"));
    }

    #[test]
    fn test_miss_count_grows_then_resets_on_match() {
        let perception = StubPerception::new();
        let cancel = CancelToken::new();
        let config = config();
        let mut tracker = TargetTracker::new(&perception, &cancel, &config);

        for expected in 1..=4 {
            assert_eq!(tracker.track(None).unwrap(), TrackOutcome::Missed { misses: expected });
            assert_eq!(tracker.target().miss_count, expected);
        }

        perception.set_detections("chest1", vec![DetectionBox::new("chest1", 5, 5, 4, 4, 0.9)]);
        assert!(matches!(tracker.track(None).unwrap(), TrackOutcome::Found(_)));
        assert_eq!(tracker.target().miss_count, 0);
    }

    #[test]
    fn test_reacquisition_sweep_at_miss_limit() {
        let perception = StubPerception::new();
        let cancel = CancelToken::new();
        let config = TrackerConfig {
            miss_limit: 2,
            reacquire_attempts: 3,
            ..config()
        };
        let mut tracker = TargetTracker::new(&perception, &cancel, &config);

        assert_eq!(tracker.track(None).unwrap(), TrackOutcome::Missed { misses: 1 });
        let before = perception.detect_calls();
        assert_eq!(tracker.track(None).unwrap(), TrackOutcome::Lost);
        // the failed pass plus three sweep attempts, five labels each
        assert_eq!(perception.detect_calls() - before, 4 * 5);
    }

    #[test]
    fn test_reacquisition_finds_target() {
        let perception = StubPerception::new();
        // chest5 is absent for the first scan, present on the second
        perception.script_detections(
            "chest5",
            vec![vec![], vec![DetectionBox::new("chest5", 7, 7, 4, 4, 0.9)]],
        );
        let cancel = CancelToken::new();
        let config = TrackerConfig {
            miss_limit: 1,
            ..config()
        };
        let mut tracker = TargetTracker::new(&perception, &cancel, &config);

        let outcome = tracker.track(None).unwrap();
        assert!(matches!(outcome, TrackOutcome::Reacquired(ref b) if b.label == "chest5"));
        assert_eq!(tracker.target().miss_count, 0);
    }

    #[test]
    fn test_wait_for_any_times_out() {
        let perception = StubPerception::new();
        let cancel = CancelToken::new();
        let config = config();
        let mut tracker = TargetTracker::new(&perception, &cancel, &config);
        let started = Instant::now();
        assert!(tracker.wait_for_any(Duration::from_millis(60)).unwrap().is_none());
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_wait_for_any_prefers_label_priority_over_confidence() {
        let perception = StubPerception::new();
        perception.set_detections("chest4", vec![DetectionBox::new("chest4", 50, 5, 4, 4, 0.99)]);
        perception.set_detections("chest2", vec![DetectionBox::new("chest2", 7, 7, 4, 4, 0.65)]);
        let cancel = CancelToken::new();
        let config = config();
        let mut tracker = TargetTracker::new(&perception, &cancel, &config);

        let hit = tracker.wait_for_any(Duration::from_secs(1)).unwrap().unwrap();
        assert_eq!(hit.label, "chest2");
        assert_eq!(
            perception.queried_labels(),
            vec![vec!["chest1".to_string()], vec!["chest2".to_string()]]
        );
    }

    #[test]
    fn test_wait_for_any_returns_first_hit() {
        let perception = StubPerception::new();
        perception.set_detections("chest2", vec![DetectionBox::new("chest2", 7, 7, 4, 4, 0.9)]);
        let cancel = CancelToken::new();
        let config = config();
        let mut tracker = TargetTracker::new(&perception, &cancel, &config);
        let hit = tracker.wait_for_any(Duration::from_secs(1)).unwrap().unwrap();
        assert_eq!(hit.label, "chest2");
        assert_eq!(tracker.target().locked_label.as_deref(), Some("chest2"));
    }
}
