//! Encounter phases and their outcomes.

use std::fmt;
use std::time::{Duration, Instant};

/// Encounter state machine phases, in the order an iteration walks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Returning to the main game view
    MainPage,
    /// Opening the map and the world boss list
    EnteringArea,
    /// Picking the boss and confirming travel
    SelectingTarget,
    /// Teleporting in and starting combat
    Activating,
    /// Fighting until the boss or a chest shows up
    Monitoring,
    /// Waiting for the boss banner to clear
    AwaitingClear,
    /// Looking for the chest
    Searching,
    /// Walking to the chest
    Approaching,
    /// Opening the chest
    Interacting,
    /// Collecting the reward
    ClaimingReward,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::MainPage => write!(f, "Main page"),
            Phase::EnteringArea => write!(f, "Entering area"),
            Phase::SelectingTarget => write!(f, "Selecting target"),
            Phase::Activating => write!(f, "Activating"),
            Phase::Monitoring => write!(f, "Monitoring"),
            Phase::AwaitingClear => write!(f, "Awaiting clear"),
            Phase::Searching => write!(f, "Searching"),
            Phase::Approaching => write!(f, "Approaching"),
            Phase::Interacting => write!(f, "Interacting"),
            Phase::ClaimingReward => write!(f, "Claiming reward"),
        }
    }
}

/// Result of one phase. `Skip` abandons the iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseOutcome<T = ()> {
    Done(T),
    Skip(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum IterationOutcome {
    Complete,
    Skipped { phase: Phase, reason: String },
}

/// Per-iteration state, rebuilt at the start of every iteration.
#[derive(Debug, Clone)]
pub struct PhaseContext {
    /// 1-based iteration number
    pub loop_index: u32,
    pub phase: Phase,
    pub locked_label: Option<String>,
    pub started_at: Instant,
}

impl PhaseContext {
    pub fn new(loop_index: u32) -> Self {
        Self {
            loop_index,
            phase: Phase::MainPage,
            locked_label: None,
            started_at: Instant::now(),
        }
    }

    pub fn enter(&mut self, phase: Phase) {
        tracing::debug!(iteration = self.loop_index, phase = %phase, "entering phase");
        self.phase = phase;
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub iterations: u32,
    pub completed: u32,
    pub skipped: u32,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &IterationOutcome) {
        self.iterations += 1;
        match outcome {
            IterationOutcome::Complete => self.completed += 1,
            IterationOutcome::Skipped { .. } => self.skipped += 1,
        }
    }
}
