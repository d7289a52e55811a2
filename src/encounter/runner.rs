//! Running the encounter loop on a background thread.

use anyhow::Result;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::diagnostics::Diagnostics;
use super::orchestrator::Orchestrator;
use super::phase::RunSummary;
use crate::config::EncounterConfig;
use crate::control::{CancelToken, is_cancellation};
use crate::input::InputDevice;
use crate::vision::Perception;

#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunSummary),
    Cancelled,
    Failed(anyhow::Error),
}

/// A started run. Dropping the handle does not stop the run; call `abort`.
pub struct RunHandle {
    cancel: CancelToken,
    thread: JoinHandle<Result<RunSummary>>,
}

impl RunHandle {
    /// Requests cancellation. The run stops at its next wait.
    pub fn abort(&self) {
        tracing::info!("abort requested");
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn join(self) -> RunOutcome {
        match self.thread.join() {
            Ok(Ok(summary)) => RunOutcome::Completed(summary),
            Ok(Err(e)) if is_cancellation(&e) => RunOutcome::Cancelled,
            Ok(Err(e)) => RunOutcome::Failed(e),
            Err(_) => RunOutcome::Failed(anyhow::anyhow!("encounter thread panicked")),
        }
    }
}

/// Spawns the encounter loop.
pub fn start_run(
    perception: Arc<dyn Perception>,
    input: Arc<dyn InputDevice>,
    diagnostics: Arc<dyn Diagnostics>,
    config: EncounterConfig,
) -> Result<RunHandle> {
    let cancel = CancelToken::new();
    let run_cancel = cancel.clone();

    let thread = thread::Builder::new()
        .name("encounter".into())
        .spawn(move || {
            let mut orchestrator = Orchestrator::new(
                perception.as_ref(),
                input.as_ref(),
                diagnostics.as_ref(),
                &config,
                &run_cancel,
            )?;
            orchestrator.run()
        })?;

    Ok(RunHandle { cancel, thread })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timings;
    use crate::testing::{RecordingInput, StubPerception};
    use crate::vision::Frame;
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    struct QuietDiagnostics;

    impl Diagnostics for QuietDiagnostics {
        fn notify(&self, _message: &str) {}

        fn screenshot(&self, _tag: &str) -> Result<Option<PathBuf>> {
            Ok(None)
        }
    }

    fn config() -> EncounterConfig {
        let mut config = EncounterConfig {
            loop_count: 3,
            cooldown_ms: 0,
            timings: Timings::instant(),
            ..EncounterConfig::default()
        };
        config.timeouts.main_page_ms = 20;
        config
    }

    #[test]
    fn test_run_without_main_page_completes_with_skips() {
        let perception = Arc::new(StubPerception::with_frame(Frame::filled(192, 108, [0, 0, 0])));
        let input = Arc::new(RecordingInput::new());

        let handle =
            start_run(perception, input.clone(), Arc::new(QuietDiagnostics), config()).unwrap();
        match handle.join() {
            RunOutcome::Completed(summary) => {
                assert_eq!(summary.iterations, 3);
                assert_eq!(summary.skipped, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(input.held_keys().is_empty());
    }

    #[test]
    fn test_abort_ends_run_as_cancelled() {
        let perception = Arc::new(StubPerception::with_frame(Frame::filled(192, 108, [0, 0, 0])));
        let input = Arc::new(RecordingInput::new());
        let mut config = config();
        config.loop_count = 1000;
        config.timings.skip_delay_ms = 60_000;

        let handle =
            start_run(perception, input.clone(), Arc::new(QuietDiagnostics), config).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        let started = Instant::now();
        handle.abort();
        assert!(matches!(handle.join(), RunOutcome::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(input.held_keys().is_empty());
    }
}
