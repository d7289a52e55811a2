//! Moving and looking at the same time when no target is visible.
//!
//! A search runs two workers inside one thread scope: the searcher polls
//! perception for any candidate label, the mover walks a fixed choreography.
//! The first hit goes through a one-shot channel to the caller, which stops
//! both workers and joins them before returning.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::time::{Duration, Instant};

use super::cancel::{CancelToken, Cancelled, is_cancellation};
use super::tracker::scan_in_order;
use crate::input::{Direction, InputDevice, KeyBindings, hold_directions};
use crate::vision::{DetectionBox, Perception};

/// Caller-side wait slice between cancellation and deadline checks.
const WAIT_SLICE: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPattern {
    /// Forward, back, forward, left, right with short pauses.
    #[default]
    Cross,
    /// The cross plus four diagonals, no pauses.
    Star,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchMove {
    pub directions: Vec<Direction>,
    pub hold: Duration,
    pub pause: Duration,
}

impl SearchMove {
    fn new(directions: &[Direction], hold_secs: f32, pause_secs: f32) -> Self {
        Self {
            directions: directions.to_vec(),
            hold: Duration::from_secs_f32(hold_secs),
            pause: Duration::from_secs_f32(pause_secs),
        }
    }
}

impl SearchPattern {
    pub fn moves(self) -> Vec<SearchMove> {
        use Direction::*;
        match self {
            SearchPattern::Cross => vec![
                SearchMove::new(&[Forward], 5.0, 0.5),
                SearchMove::new(&[Back], 9.0, 0.5),
                SearchMove::new(&[Forward], 5.0, 0.5),
                SearchMove::new(&[Left], 5.0, 0.5),
                SearchMove::new(&[Right], 9.0, 0.5),
            ],
            SearchPattern::Star => vec![
                SearchMove::new(&[Forward], 5.0, 0.0),
                SearchMove::new(&[Back], 9.0, 0.0),
                SearchMove::new(&[Forward], 5.0, 0.0),
                SearchMove::new(&[Left], 5.0, 0.0),
                SearchMove::new(&[Right], 9.0, 0.0),
                SearchMove::new(&[Left], 5.0, 0.0),
                SearchMove::new(&[Left, Forward], 5.0, 0.0),
                SearchMove::new(&[Back, Right], 9.0, 0.0),
                SearchMove::new(&[Left, Forward], 5.0, 0.0),
                SearchMove::new(&[Forward, Right], 5.0, 0.0),
                SearchMove::new(&[Left, Back], 9.0, 0.0),
            ],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub threshold: f32,
    pub timeout_ms: u64,
    /// Pause between searcher polls.
    pub poll_interval_ms: u64,
    pub pattern: SearchPattern,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            timeout_ms: 60_000,
            poll_interval_ms: 100,
            pattern: SearchPattern::Cross,
        }
    }
}

enum WaitEnd {
    Found(DetectionBox),
    Exhausted,
    SearcherStopped,
    Cancelled,
}

pub struct ParallelSearch<'a> {
    perception: &'a dyn Perception,
    input: &'a dyn InputDevice,
    keys: &'a KeyBindings,
    cancel: &'a CancelToken,
    labels: Vec<&'a str>,
    config: &'a SearchConfig,
    moves: Vec<SearchMove>,
}

impl<'a> ParallelSearch<'a> {
    pub fn new(
        perception: &'a dyn Perception,
        input: &'a dyn InputDevice,
        keys: &'a KeyBindings,
        cancel: &'a CancelToken,
        labels: Vec<&'a str>,
        config: &'a SearchConfig,
    ) -> Self {
        Self {
            perception,
            input,
            keys,
            cancel,
            labels,
            config,
            moves: config.pattern.moves(),
        }
    }

    /// Replaces the pattern's choreography.
    pub fn with_moves(mut self, moves: Vec<SearchMove>) -> Self {
        self.moves = moves;
        self
    }

    /// Runs one search. `Ok(None)` means the timeout passed with nothing found.
    pub fn search(&self) -> Result<Option<DetectionBox>> {
        self.cancel.check()?;
        let timeout = Duration::from_millis(self.config.timeout_ms);
        tracing::info!(
            pattern = ?self.config.pattern,
            timeout_secs = timeout.as_secs(),
            threshold = self.config.threshold,
            "starting search"
        );

        let scope_token = self.cancel.child();
        let (found_tx, found_rx) = mpsc::sync_channel::<DetectionBox>(1);
        let deadline = Instant::now() + timeout;

        let (end, searcher_result, mover_result) = std::thread::scope(|s| {
            let token = &scope_token;
            let searcher =
                s.spawn(move || stop_scope_on_failure(token, self.run_searcher(token, found_tx)));
            let mover = s.spawn(move || stop_scope_on_failure(token, self.run_mover(token)));

            let end = self.wait(&found_rx, deadline);
            scope_token.cancel();

            let searcher_result = searcher
                .join()
                .unwrap_or_else(|_| Err(anyhow!("search worker panicked")));
            let mover_result = mover
                .join()
                .unwrap_or_else(|_| Err(anyhow!("movement worker panicked")));
            (end, searcher_result, mover_result)
        });

        if self.cancel.is_cancelled() || matches!(end, WaitEnd::Cancelled) {
            tracing::info!("search cancelled");
            return Err(Cancelled.into());
        }
        for result in [searcher_result, mover_result] {
            if let Err(e) = result {
                if !is_cancellation(&e) {
                    return Err(e);
                }
            }
        }

        match end {
            WaitEnd::Found(found) => {
                tracing::info!(
                    label = %found.label,
                    center = ?found.center(),
                    "search found target"
                );
                Ok(Some(found))
            }
            _ => {
                tracing::info!("search finished without a target");
                Ok(None)
            }
        }
    }

    fn wait(&self, found_rx: &mpsc::Receiver<DetectionBox>, deadline: Instant) -> WaitEnd {
        loop {
            if self.cancel.is_cancelled() {
                return WaitEnd::Cancelled;
            }
            let now = Instant::now();
            if now >= deadline {
                return WaitEnd::Exhausted;
            }
            match found_rx.recv_timeout(WAIT_SLICE.min(deadline - now)) {
                Ok(found) => return WaitEnd::Found(found),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return WaitEnd::SearcherStopped,
            }
        }
    }

    fn run_searcher(&self, token: &CancelToken, found_tx: SyncSender<DetectionBox>) -> Result<()> {
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        loop {
            token.check()?;
            if let Some(hit) =
                scan_in_order(self.perception, &self.labels, None, self.config.threshold)?
            {
                tracing::debug!(label = %hit.label, "searcher hit");
                // The receiver may already have given up
                let _ = found_tx.try_send(hit);
                return Ok(());
            }
            token.sleep(interval)?;
        }
    }

    fn run_mover(&self, token: &CancelToken) -> Result<()> {
        for step in &self.moves {
            token.check()?;
            tracing::debug!(
                directions = ?step.directions,
                hold_ms = step.hold.as_millis() as u64,
                "search move"
            );
            hold_directions(self.input, token, self.keys, &step.directions, step.hold)?;
            if !step.pause.is_zero() {
                token.sleep(step.pause)?;
            }
        }
        tracing::debug!("search choreography finished");
        Ok(())
    }
}

/// A failed worker stops its sibling. The searcher's sender drops as it
/// exits, which wakes the caller.
fn stop_scope_on_failure(token: &CancelToken, result: Result<()>) -> Result<()> {
    if let Err(e) = &result {
        if !is_cancellation(e) {
            tracing::warn!(error = %e, "search worker failed");
            token.cancel();
        }
    }
    result
}
