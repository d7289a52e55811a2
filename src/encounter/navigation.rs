//! UI navigation capabilities shared by the encounter phases.
//!
//! `NavigationContext` bundles perception, input, configuration and the
//! run's cancellation token. Every wait goes through the token, and every
//! coordinate is authored at the reference resolution and scaled against
//! the latest frame.

use anyhow::{Context, Result};
use regex::Regex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::landmarks::{self, RefPoint, labels};
use crate::config::{EncounterConfig, millis};
use crate::control::CancelToken;
use crate::input::{self, ClickOptions, HeldKey, InputDevice, Key};
use crate::vision::{
    Bgr, CoordinateMapper, DetectionBox, Frame, Perception, Region, color_distance, color_similar,
    is_white,
};

/// Compiled prompt patterns for the arrival check.
pub struct PromptMatcher {
    patterns: Vec<Regex>,
}

impl PromptMatcher {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("Invalid prompt pattern {:?}", p)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// OCR splits CJK text into single-glyph words, so whitespace is ignored.
    pub fn matches(&self, text: &str) -> bool {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        self.patterns.iter().any(|p| p.is_match(&compact))
    }
}

pub struct NavigationContext<'a> {
    pub perception: &'a dyn Perception,
    pub input: &'a dyn InputDevice,
    pub config: &'a EncounterConfig,
    pub cancel: &'a CancelToken,
}

impl<'a> NavigationContext<'a> {
    pub fn new(
        perception: &'a dyn Perception,
        input: &'a dyn InputDevice,
        config: &'a EncounterConfig,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            perception,
            input,
            config,
            cancel,
        }
    }

    pub fn sleep_ms(&self, ms: u64) -> Result<()> {
        self.cancel.sleep(millis(ms))
    }

    pub fn frame(&self) -> Result<Option<Arc<Frame>>> {
        self.perception.current_frame()
    }

    /// Scales a reference point against the current frame.
    pub fn scaled(&self, point: RefPoint) -> Result<(i32, i32)> {
        let frame = self.frame()?;
        Ok(CoordinateMapper::for_frame(frame.as_deref()).scale(point.0, point.1))
    }

    pub fn scaled_region(&self, corners: (RefPoint, RefPoint)) -> Result<Region> {
        let frame = self.frame()?;
        let ((x1, y1), (x2, y2)) = corners;
        Ok(CoordinateMapper::for_frame(frame.as_deref()).scale_region(x1, y1, x2, y2))
    }

    /// Colours at the given reference points in one frame. `None` without a
    /// frame or when any point falls outside it.
    pub fn sample<const N: usize>(&self, points: [RefPoint; N]) -> Result<Option<[Bgr; N]>> {
        let Some(frame) = self.frame()? else {
            return Ok(None);
        };
        let mapper = CoordinateMapper::for_frame(Some(&frame));
        let mut colors = [[0u8; 3]; N];
        for (slot, point) in colors.iter_mut().zip(points) {
            let (x, y) = mapper.scale(point.0, point.1);
            match frame.pixel(x, y) {
                Some(color) => *slot = color,
                None => return Ok(None),
            }
        }
        Ok(Some(colors))
    }

    pub fn tap(&self, key: Key, hold_ms: u64) -> Result<()> {
        input::tap(self.input, self.cancel, key, millis(hold_ms))
    }

    fn click_options(&self) -> ClickOptions {
        ClickOptions {
            down_time: millis(self.config.timings.click_down_ms),
        }
    }

    pub fn click(&self, x: i32, y: i32) -> Result<()> {
        self.cancel.check()?;
        self.input.click(x, y, self.click_options())
    }

    pub fn click_box(&self, target: &DetectionBox) -> Result<()> {
        let (x, y) = target.center();
        tracing::debug!(label = %target.label, x, y, "clicking detection");
        self.click(x, y)
    }

    /// Holds the mouse-mode modifier around a click so the cursor is free.
    /// Runs as one exclusive input operation.
    pub fn modifier_click(&self, x: i32, y: i32) -> Result<()> {
        let timings = &self.config.timings;
        let modifier = self.config.keys.mouse_mode;
        self.input.exclusive_operate(&mut || {
            let held = HeldKey::press(self.input, modifier)?;
            self.sleep_ms(timings.modifier_down_ms)?;
            self.input.click(x, y, self.click_options())?;
            self.sleep_ms(timings.modifier_release_ms)?;
            held.release()
        })
    }

    pub fn find_one(&self, label: &str, threshold: f32) -> Result<Option<DetectionBox>> {
        Ok(self.perception.detect(&[label], None, threshold)?.into_iter().next())
    }

    /// Polls for `label` until it appears or `timeout_ms` passes.
    pub fn wait_feature(
        &self,
        label: &str,
        timeout_ms: u64,
        threshold: f32,
    ) -> Result<Option<DetectionBox>> {
        let deadline = Instant::now() + millis(timeout_ms);
        loop {
            self.cancel.check()?;
            if let Some(found) = self.find_one(label, threshold)? {
                return Ok(Some(found));
            }
            if Instant::now() >= deadline {
                tracing::warn!(label, timeout_ms, "feature did not appear");
                return Ok(None);
            }
            self.sleep_ms(self.config.timings.feature_poll_ms)?;
        }
    }

    /// Waits for `label`, clicks it, then settles. False on timeout.
    pub fn wait_and_click(&self, label: &str, timeout_ms: u64, settle_ms: u64) -> Result<bool> {
        let Some(found) = self.wait_feature(label, timeout_ms, self.config.thresholds.ui)? else {
            return Ok(false);
        };
        tracing::info!(label, "found and clicking");
        self.click_box(&found)?;
        self.sleep_ms(settle_ms)?;
        Ok(true)
    }

    pub fn is_main_page(&self) -> Result<bool> {
        Ok(self.sample([landmarks::MAIN_PAGE])?.is_some_and(|[c]| {
            color_similar(c, landmarks::MAIN_PAGE_COLOR, landmarks::MAIN_PAGE_TOLERANCE)
        }))
    }

    pub fn wait_for_main_page_color(&self, timeout_ms: u64) -> Result<bool> {
        let deadline = Instant::now() + millis(timeout_ms);
        loop {
            if self.is_main_page()? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            self.sleep_ms(self.config.timings.main_page_poll_ms)?;
        }
    }

    /// Backs out of menus and dungeons until the main view shows.
    pub fn ensure_main_page(&self) -> Result<bool> {
        let timings = &self.config.timings;
        let deadline = Instant::now() + millis(self.config.timeouts.main_page_ms);

        while Instant::now() < deadline {
            self.cancel.check()?;
            if self.frame()?.is_none() {
                tracing::warn!("no frame available");
                self.sleep_ms(timings.escape_settle_ms)?;
                continue;
            }

            if self.is_main_page()? {
                tracing::info!("main page detected");
                self.sleep_ms(timings.main_page_settle_ms)?;
                return Ok(true);
            }

            if let Some(back) = self.find_one(labels::BACK, self.config.thresholds.back)? {
                self.click_box(&back)?;
                self.sleep_ms(timings.back_settle_ms)?;
                continue;
            }

            if self
                .sample([landmarks::EXIT_CHECK])?
                .is_some_and(|[c]| is_white(c))
            {
                self.exit_dungeon()?;
                continue;
            }

            tracing::debug!("pressing escape to back out");
            self.tap(Key::Escape, 50)?;
            self.sleep_ms(timings.escape_settle_ms)?;
        }

        tracing::warn!("main page not reached in time");
        Ok(false)
    }

    /// Leaves the current dungeon through the exit button and confirm dialog.
    pub fn exit_dungeon(&self) -> Result<bool> {
        let (x, y) = self.scaled(landmarks::EXIT_CHECK)?;
        tracing::info!("leaving dungeon");
        self.modifier_click(x, y)?;

        let Some(confirm) = self.wait_feature(
            labels::CONFIRM,
            self.config.timeouts.exit_confirm_ms,
            self.config.thresholds.ui,
        )?
        else {
            return Ok(false);
        };
        let (cx, cy) = confirm.center();
        self.modifier_click(cx, cy)?;
        self.sleep_ms(self.config.timings.exit_settle_ms)?;
        Ok(true)
    }

    pub fn start_auto_combat(&self) -> Result<()> {
        let (x, y) = self.scaled(landmarks::AUTO_COMBAT)?;
        tracing::debug!(x, y, "enabling auto combat");
        self.modifier_click(x, y)?;
        self.sleep_ms(self.config.timings.auto_combat_settle_ms)
    }

    pub fn is_boss_spawned(&self) -> Result<bool> {
        let [(p1, c1), (p2, c2)] = landmarks::BOSS_BANNER;
        Ok(self
            .sample([p1, p2])?
            .is_some_and(|[a, b]| a == c1 && b == c2))
    }

    /// `None` when the frame cannot be read.
    pub fn boss_still_shown(&self) -> Result<Option<bool>> {
        let [(p1, c1), (p2, c2)] = landmarks::BOSS_BANNER;
        Ok(self
            .sample([p1, p2, landmarks::BOSS_ALIVE_MARKER])?
            .map(|[a, b, m]| a == c1 && b == c2 && m == [255, 255, 255]))
    }

    pub fn character_state_normal(&self) -> Result<bool> {
        Ok(self.sample([landmarks::CHARACTER_STATE])?.is_some_and(|[c]| {
            color_distance(c, landmarks::CHARACTER_STATE_COLOR)
                <= landmarks::CHARACTER_STATE_MAX_DISTANCE
        }))
    }

    /// Taps back until the avatar state indicator looks normal again.
    pub fn recover_character_state(&self) -> Result<bool> {
        let timings = &self.config.timings;
        tracing::info!("avatar state abnormal, recovering");
        for attempt in 1..=timings.recover_attempts {
            self.tap(self.config.keys.back, timings.recover_hold_ms)?;
            self.sleep_ms(timings.recover_settle_ms)?;
            if self.character_state_normal()? {
                tracing::info!(attempt, "avatar state recovered");
                return Ok(true);
            }
        }
        tracing::warn!(attempts = timings.recover_attempts, "avatar state did not recover");
        Ok(false)
    }

    /// Reads the interaction prompt. Read failures count as no match.
    pub fn prompt_shown(&self, matcher: &PromptMatcher) -> Result<bool> {
        let region = self.scaled_region(landmarks::PROMPT_REGION)?;
        match self.perception.read_text(region) {
            Ok(lines) => {
                if !lines.is_empty() {
                    let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
                    tracing::trace!(texts = ?texts, "prompt OCR");
                }
                Ok(lines.iter().any(|l| matcher.matches(&l.text)))
            }
            Err(e) => {
                tracing::debug!(error = %e, "prompt OCR failed");
                Ok(false)
            }
        }
    }

    pub fn deadline(&self, timeout_ms: u64) -> Instant {
        Instant::now() + Duration::from_millis(timeout_ms)
    }
}
