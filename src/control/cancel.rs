//! Cooperative cancellation.
//!
//! A `CancelToken` is a shared stop flag checked at every suspension point.
//! Child tokens observe their parent, so a search scope can be stopped locally
//! without touching the run-wide token.

use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Granularity of cancellable sleeps.
pub const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Raised when a run (or a scope inside it) has been told to stop.
#[derive(Debug, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Returns true if the error chain is a cancellation rather than a failure.
pub fn is_cancellation(err: &anyhow::Error) -> bool {
    err.is::<Cancelled>()
}

#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Box<CancelToken>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that is cancelled when either it or `self` is cancelled.
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Box::new(self.clone())),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    /// Returns `Err(Cancelled)` if the token has been cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Cancelled.into());
        }
        Ok(())
    }

    /// Sleeps for `duration` in short slices, returning `Err(Cancelled)` as
    /// soon as cancellation is observed.
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}
