//! Closed-loop control primitives: cancellation, tracking, steering, search,
//! debouncing and cooldown gating.

pub mod cancel;
pub mod cooldown;
pub mod debounce;
pub mod search;
pub mod steering;
pub mod tracker;

pub use cancel::{CancelToken, Cancelled, is_cancellation};
pub use cooldown::CooldownTracker;
pub use debounce::{ConsecutiveConfirm, StabilityDebouncer};
pub use search::{ParallelSearch, SearchConfig, SearchMove, SearchPattern};
pub use steering::{SteeringConfig, SteeringController, SteeringDecision, plan};
pub use tracker::{TargetTracker, TrackOutcome, TrackedTarget, TrackerConfig, scan_in_order};
