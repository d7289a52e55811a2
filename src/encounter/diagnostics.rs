//! Operator notifications and error screenshots.

use anyhow::{Context, Result};
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;

use crate::vision::Perception;

pub trait Diagnostics: Send + Sync {
    fn notify(&self, message: &str);

    /// Saves the current frame tagged with `tag`. Returns where it went,
    /// or `None` without a frame.
    fn screenshot(&self, tag: &str) -> Result<Option<PathBuf>>;
}

/// Logs notifications and writes screenshots as PNG files.
pub struct FileDiagnostics {
    perception: Arc<dyn Perception>,
    dir: PathBuf,
}

impl FileDiagnostics {
    pub fn new(perception: Arc<dyn Perception>, dir: impl Into<PathBuf>) -> Self {
        Self {
            perception,
            dir: dir.into(),
        }
    }
}

impl Diagnostics for FileDiagnostics {
    fn notify(&self, message: &str) {
        tracing::info!(notify = true, "{}", message);
    }

    fn screenshot(&self, tag: &str) -> Result<Option<PathBuf>> {
        let Some(frame) = self.perception.current_frame()? else {
            return Ok(None);
        };
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S%.3f");
        let path = self.dir.join(format!("{}_{}.png", tag, timestamp));
        frame
            .to_rgb_image()
            .save(&path)
            .with_context(|| format!("Failed to save {}", path.display()))?;

        tracing::info!(path = %path.display(), "screenshot saved");
        Ok(Some(path))
    }
}
