//! Perception façade.
//!
//! The control loop only sees the `Perception` trait. `DetectionGateway` is the
//! production implementation: it grabs a frame, shares it between queries
//! for a short while, and hands it to a template matcher or text reader.

use anyhow::{Result, anyhow};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::frame::{DetectionBox, Frame, Region, TextBox};

/// What the control loop needs from the perception layer.
pub trait Perception: Send + Sync {
    /// Latest capture, or `None` while capture is unavailable.
    fn current_frame(&self) -> Result<Option<Arc<Frame>>>;

    /// Detections for any of `labels` inside `region` (full frame if `None`)
    /// scoring at least `threshold`, best first. Empty when nothing matched.
    fn detect(
        &self,
        labels: &[&str],
        region: Option<Region>,
        threshold: f32,
    ) -> Result<Vec<DetectionBox>>;

    /// OCR over `region`.
    fn read_text(&self, region: Region) -> Result<Vec<TextBox>>;
}

/// Produces frames of the game client area.
pub trait FrameSource: Send + Sync {
    fn grab(&self) -> Result<Option<Frame>>;
}

/// Finds labelled templates in a frame.
pub trait Matcher: Send + Sync {
    fn find(
        &self,
        frame: &Frame,
        labels: &[&str],
        region: Region,
        threshold: f32,
    ) -> Result<Vec<DetectionBox>>;
}

/// Recognises text in a frame region.
pub trait TextReader: Send + Sync {
    fn read(&self, frame: &Frame, region: Region) -> Result<Vec<TextBox>>;
}

/// How long one grabbed frame serves further queries by default.
pub const DEFAULT_FRAME_MAX_AGE: Duration = Duration::from_millis(80);

pub struct DetectionGateway {
    source: Box<dyn FrameSource>,
    matcher: Box<dyn Matcher>,
    reader: Box<dyn TextReader>,
    max_age: Duration,
    latest: Mutex<Option<(Instant, Arc<Frame>)>>,
}

impl DetectionGateway {
    pub fn new(
        source: Box<dyn FrameSource>,
        matcher: Box<dyn Matcher>,
        reader: Box<dyn TextReader>,
    ) -> Self {
        Self {
            source,
            matcher,
            reader,
            max_age: DEFAULT_FRAME_MAX_AGE,
            latest: Mutex::new(None),
        }
    }

    /// Queries within `max_age` of a grab reuse that frame. Zero grabs every time.
    pub fn with_frame_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// The shared frame, grabbing a new one once it is too old. The lock is
    /// held across the grab so concurrent queries wait for the same capture.
    fn frame(&self) -> Result<Option<Arc<Frame>>> {
        let mut latest = self
            .latest
            .lock()
            .map_err(|_| anyhow!("frame cache poisoned"))?;
        if let Some((grabbed_at, frame)) = latest.as_ref() {
            if grabbed_at.elapsed() < self.max_age {
                return Ok(Some(Arc::clone(frame)));
            }
        }

        let frame = self.source.grab()?.map(Arc::new);
        *latest = frame.as_ref().map(|f| (Instant::now(), Arc::clone(f)));
        Ok(frame)
    }
}

impl Perception for DetectionGateway {
    fn current_frame(&self) -> Result<Option<Arc<Frame>>> {
        self.frame()
    }

    fn detect(
        &self,
        labels: &[&str],
        region: Option<Region>,
        threshold: f32,
    ) -> Result<Vec<DetectionBox>> {
        let Some(frame) = self.frame()? else {
            return Ok(Vec::new());
        };
        let region = region
            .unwrap_or_else(|| frame.bounds())
            .clamp_to(frame.width(), frame.height());
        if region.is_empty() {
            return Ok(Vec::new());
        }

        let mut boxes = self.matcher.find(&frame, labels, region, threshold)?;
        boxes.retain(|b| b.confidence >= threshold);
        rank(&mut boxes);
        Ok(boxes)
    }

    fn read_text(&self, region: Region) -> Result<Vec<TextBox>> {
        let Some(frame) = self.frame()? else {
            return Ok(Vec::new());
        };
        let region = region.clamp_to(frame.width(), frame.height());
        if region.is_empty() {
            return Ok(Vec::new());
        }
        self.reader.read(&frame, region)
    }
}

/// Sorts best score first; equal scores keep their discovery order.
pub fn rank(boxes: &mut [DetectionBox]) {
    boxes.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSource(Option<Frame>);

    impl FrameSource for FixedSource {
        fn grab(&self) -> Result<Option<Frame>> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct CountingSource {
        grabs: Arc<AtomicUsize>,
    }

    impl FrameSource for CountingSource {
        fn grab(&self) -> Result<Option<Frame>> {
            let n = self.grabs.fetch_add(1, Ordering::SeqCst) as u8;
            Ok(Some(Frame::filled(20, 10, [n, 0, 0])))
        }
    }

    #[derive(Default)]
    struct EchoMatcher {
        regions: Mutex<Vec<Region>>,
    }

    impl Matcher for EchoMatcher {
        fn find(
            &self,
            _frame: &Frame,
            labels: &[&str],
            region: Region,
            _threshold: f32,
        ) -> Result<Vec<DetectionBox>> {
            self.regions.lock().unwrap().push(region);
            Ok(labels
                .iter()
                .enumerate()
                .map(|(i, l)| DetectionBox::new(*l, i as i32, 0, 4, 4, 0.5 + i as f32 * 0.1))
                .collect())
        }
    }

    struct NoText;

    impl TextReader for NoText {
        fn read(&self, _frame: &Frame, _region: Region) -> Result<Vec<TextBox>> {
            Ok(Vec::new())
        }
    }

    fn gateway(frame: Option<Frame>) -> DetectionGateway {
        DetectionGateway::new(
            Box::new(FixedSource(frame)),
            Box::new(EchoMatcher::default()),
            Box::new(NoText),
        )
    }

    #[test]
    fn test_detect_ranks_and_filters() {
        let gw = gateway(Some(Frame::filled(100, 100, [0, 0, 0])));
        let boxes = gw.detect(&["a", "b", "c"], None, 0.55).unwrap();
        let labels: Vec<_> = boxes.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["c", "b"]);
    }

    #[test]
    fn test_detect_without_frame_is_empty() {
        let gw = gateway(None);
        assert!(gw.detect(&["a"], None, 0.0).unwrap().is_empty());
        assert!(gw.current_frame().unwrap().is_none());
    }

    #[test]
    fn test_detect_outside_frame_is_empty() {
        let gw = gateway(Some(Frame::filled(10, 10, [0, 0, 0])));
        let boxes = gw.detect(&["a"], Some(Region::new(50, 50, 5, 5)), 0.0).unwrap();
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_queries_share_a_recent_frame() {
        let grabs = Arc::new(AtomicUsize::new(0));
        let gw = DetectionGateway::new(
            Box::new(CountingSource {
                grabs: Arc::clone(&grabs),
            }),
            Box::new(EchoMatcher::default()),
            Box::new(NoText),
        )
        .with_frame_max_age(Duration::from_secs(10));

        let first = gw.current_frame().unwrap().unwrap();
        gw.detect(&["a", "b"], None, 0.0).unwrap();
        gw.read_text(Region::new(0, 0, 5, 5)).unwrap();
        let again = gw.current_frame().unwrap().unwrap();

        assert_eq!(grabs.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &again));
    }

    #[test]
    fn test_stale_frame_is_regrabbed() {
        let grabs = Arc::new(AtomicUsize::new(0));
        let gw = DetectionGateway::new(
            Box::new(CountingSource {
                grabs: Arc::clone(&grabs),
            }),
            Box::new(EchoMatcher::default()),
            Box::new(NoText),
        )
        .with_frame_max_age(Duration::from_millis(20));

        let first = gw.current_frame().unwrap().unwrap();
        std::thread::sleep(Duration::from_millis(40));
        let second = gw.current_frame().unwrap().unwrap();

        assert_eq!(grabs.load(Ordering::SeqCst), 2);
        assert_eq!(first.pixel(0, 0), Some([0, 0, 0]));
        assert_eq!(second.pixel(0, 0), Some([1, 0, 0]));
    }

    #[test]
    fn test_zero_max_age_grabs_per_query() {
        let grabs = Arc::new(AtomicUsize::new(0));
        let gw = DetectionGateway::new(
            Box::new(CountingSource {
                grabs: Arc::clone(&grabs),
            }),
            Box::new(EchoMatcher::default()),
            Box::new(NoText),
        )
        .with_frame_max_age(Duration::ZERO);

        gw.current_frame().unwrap();
        gw.detect(&["a"], None, 0.0).unwrap();
        assert_eq!(grabs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_rank_is_stable_on_ties() {
        let mut boxes = vec![
            DetectionBox::new("first", 0, 0, 1, 1, 0.7),
            DetectionBox::new("second", 0, 0, 1, 1, 0.7),
            DetectionBox::new("best", 0, 0, 1, 1, 0.9),
        ];
        rank(&mut boxes);
        let labels: Vec<_> = boxes.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["best", "first", "second"]);
    }
}
