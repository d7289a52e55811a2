//! QRSL world boss encounter automation.
//!
//! Captures the game window, finds UI elements and chests by template
//! matching and OCR, and drives the game with synthetic keyboard and mouse
//! input. See `encounter::Orchestrator` for the phase loop.

#[cfg(windows)]
pub mod capture;
pub mod config;
pub mod control;
pub mod encounter;
pub mod input;
pub mod paths;
pub mod vision;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE_NAME: &str = "qrsl_encounter.log";

/// Logs to stdout and appends to `<log_dir>/qrsl_encounter.log`.
///
/// `RUST_LOG` overrides the default `info` level.
pub fn init_logging(log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create {}", log_dir.display()))?;
    let log_path = log_dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open {}", log_path.display()))?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let timer = || ChronoLocal::new("%H:%M:%S%.3f".to_string());

    let stdout_layer = tracing_subscriber::fmt::layer().with_timer(timer());
    let file_layer = tracing_subscriber::fmt::layer()
        .with_timer(timer())
        .with_ansi(false)
        .with_writer(Mutex::new(file));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .context("Logging already initialized")?;

    tracing::info!(path = %log_path.display(), "logging initialized");
    Ok(())
}
