//! The world boss encounter: phases, UI navigation and the run loop.

pub mod diagnostics;
pub mod landmarks;
pub mod navigation;
pub mod orchestrator;
pub mod phase;
pub mod runner;

pub use diagnostics::{Diagnostics, FileDiagnostics};
pub use navigation::{NavigationContext, PromptMatcher};
pub use orchestrator::Orchestrator;
pub use phase::{IterationOutcome, Phase, PhaseContext, PhaseOutcome, RunSummary};
pub use runner::{RunHandle, RunOutcome, start_run};
