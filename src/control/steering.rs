//! Turning a target's screen position into movement.
//!
//! Horizontal alignment comes first: the target is brought into a dead-zone
//! around the frame's vertical centre line, with long holds when it sits past
//! the outer boundaries and short nudges otherwise. Once aligned, the avatar
//! walks forward or back depending on how low the target sits in the frame.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::cancel::CancelToken;
use crate::input::{Direction, InputDevice, KeyBindings, hold_directions};
use crate::vision::{REFERENCE_HEIGHT, REFERENCE_WIDTH, ratio_of};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    /// Half-width of the centre dead-zone, percent of frame width.
    pub center_tolerance_percent: u32,
    /// Outer boundaries in reference pixels (of 1920).
    pub left_boundary: u32,
    pub right_boundary: u32,
    /// Forward/back split in reference pixels (of 1080).
    pub vertical_threshold: u32,
    pub coarse_hold_ms: u64,
    pub fine_hold_ms: u64,
    pub vertical_hold_ms: u64,
    /// Minimum time between steps.
    pub min_interval_ms: u64,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            center_tolerance_percent: 5,
            left_boundary: 450,
            right_boundary: 1470,
            vertical_threshold: 800,
            coarse_hold_ms: 1000,
            fine_hold_ms: 200,
            vertical_hold_ms: 1000,
            min_interval_ms: 150,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SteeringDecision {
    pub direction: Direction,
    pub hold: Duration,
    /// The target is inside the horizontal dead-zone.
    pub centered: bool,
}

/// Decides the next movement for a target centred at `center`.
pub fn plan(
    center: (i32, i32),
    frame_width: u32,
    frame_height: u32,
    config: &SteeringConfig,
) -> SteeringDecision {
    let (x, y) = center;
    let screen_center = (frame_width / 2) as i32;
    let tolerance = ratio_of(frame_width, config.center_tolerance_percent, 100);

    if x < screen_center - tolerance || x > screen_center + tolerance {
        let left_boundary = ratio_of(frame_width, config.left_boundary, REFERENCE_WIDTH);
        let right_boundary = ratio_of(frame_width, config.right_boundary, REFERENCE_WIDTH);
        let hold_ms = if x < left_boundary || x > right_boundary {
            config.coarse_hold_ms
        } else {
            config.fine_hold_ms
        };
        let direction = if x < screen_center {
            Direction::Left
        } else {
            Direction::Right
        };
        return SteeringDecision {
            direction,
            hold: Duration::from_millis(hold_ms),
            centered: false,
        };
    }

    let threshold = ratio_of(frame_height, config.vertical_threshold, REFERENCE_HEIGHT);
    let direction = if y < threshold {
        Direction::Forward
    } else {
        Direction::Back
    };
    SteeringDecision {
        direction,
        hold: Duration::from_millis(config.vertical_hold_ms),
        centered: true,
    }
}

pub struct SteeringController {
    config: SteeringConfig,
    last_step: Option<Instant>,
}

impl SteeringController {
    pub fn new(config: SteeringConfig) -> Self {
        Self {
            config,
            last_step: None,
        }
    }

    /// Issues one movement toward the target. Returns true iff the target is
    /// horizontally centred, which the approach treats as arrival.
    pub fn step(
        &mut self,
        input: &dyn InputDevice,
        keys: &KeyBindings,
        cancel: &CancelToken,
        target_center: (i32, i32),
        frame_width: u32,
        frame_height: u32,
    ) -> Result<bool> {
        let min_interval = Duration::from_millis(self.config.min_interval_ms);
        if let Some(last) = self.last_step {
            let since = last.elapsed();
            if since < min_interval {
                cancel.sleep(min_interval - since)?;
            }
        }

        let decision = plan(target_center, frame_width, frame_height, &self.config);
        tracing::debug!(
            center = ?target_center,
            direction = ?decision.direction,
            hold_ms = decision.hold.as_millis() as u64,
            "steering"
        );
        hold_directions(input, cancel, keys, &[decision.direction], decision.hold)?;
        self.last_step = Some(Instant::now());
        Ok(decision.centered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Key;
    use crate::testing::{InputEvent, RecordingInput};

    fn fast_config() -> SteeringConfig {
        SteeringConfig {
            coarse_hold_ms: 10,
            fine_hold_ms: 2,
            vertical_hold_ms: 10,
            min_interval_ms: 0,
            ..SteeringConfig::default()
        }
    }

    #[test]
    fn test_centered_target_walks_vertically() {
        let config = SteeringConfig::default();
        // 1000x1080: dead-zone 450..=550, vertical threshold 800
        let above = plan((500, 300), 1000, 1080, &config);
        assert!(above.centered);
        assert_eq!(above.direction, Direction::Forward);
        assert_eq!(above.hold, Duration::from_secs(1));

        let below = plan((500, 900), 1000, 1080, &config);
        assert!(below.centered);
        assert_eq!(below.direction, Direction::Back);
    }

    #[test]
    fn test_far_left_target_gets_long_hold() {
        let decision = plan((100, 500), 1000, 1080, &SteeringConfig::default());
        assert!(!decision.centered);
        assert_eq!(decision.direction, Direction::Left);
        assert_eq!(decision.hold, Duration::from_secs(1));
    }

    #[test]
    fn test_inside_boundaries_gets_short_hold() {
        let config = SteeringConfig::default();
        // boundaries at 234 and 765 for width 1000
        let left = plan((300, 500), 1000, 1080, &config);
        assert_eq!((left.direction, left.hold), (Direction::Left, Duration::from_millis(200)));
        let right = plan((700, 500), 1000, 1080, &config);
        assert_eq!((right.direction, right.hold), (Direction::Right, Duration::from_millis(200)));
        let far_right = plan((900, 500), 1000, 1080, &config);
        assert_eq!(far_right.hold, Duration::from_secs(1));
    }

    #[test]
    fn test_dead_zone_edges_are_inclusive() {
        let config = SteeringConfig::default();
        assert!(plan((450, 500), 1000, 1080, &config).centered);
        assert!(plan((550, 500), 1000, 1080, &config).centered);
        assert!(!plan((449, 500), 1000, 1080, &config).centered);
        assert!(!plan((551, 500), 1000, 1080, &config).centered);
    }

    #[test]
    fn test_step_presses_one_key_and_releases_it() {
        let input = RecordingInput::new();
        let cancel = CancelToken::new();
        let keys = KeyBindings::default();
        let mut controller = SteeringController::new(fast_config());

        let centered = controller.step(&input, &keys, &cancel, (100, 500), 1000, 1080).unwrap();
        assert!(!centered);
        assert_eq!(
            input.events(),
            vec![InputEvent::Down(Key::Char('a')), InputEvent::Up(Key::Char('a'))]
        );

        let centered = controller.step(&input, &keys, &cancel, (500, 300), 1000, 1080).unwrap();
        assert!(centered);
        assert!(input.held_keys().is_empty());
        assert_eq!(input.opposing_violations(), 0);
    }

    #[test]
    fn test_step_releases_key_on_cancel() {
        let input = RecordingInput::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut controller = SteeringController::new(fast_config());
        let result =
            controller.step(&input, &KeyBindings::default(), &cancel, (500, 300), 1000, 1080);
        assert!(result.is_err());
        assert!(input.held_keys().is_empty());
    }
}
