//! The encounter state machine.
//!
//! One iteration walks MainPage → EnteringArea → SelectingTarget → Activating
//! → Monitoring → (AwaitingClear) → Searching → Approaching → Interacting →
//! ClaimingReward. A phase that times out or exhausts its recovery skips the
//! rest of the iteration; only cancellation and unexpected errors end the run.

use anyhow::Result;
use std::time::Instant;

use super::diagnostics::Diagnostics;
use super::landmarks::{self, labels};
use super::navigation::{NavigationContext, PromptMatcher};
use super::phase::{IterationOutcome, Phase, PhaseContext, PhaseOutcome, RunSummary};
use crate::config::{EncounterConfig, millis};
use crate::control::{
    CancelToken, ConsecutiveConfirm, CooldownTracker, ParallelSearch, StabilityDebouncer,
    SteeringController, TargetTracker, TrackOutcome, is_cancellation, scan_in_order,
};
use crate::input::{InputDevice, hold_keys};
use crate::vision::{DetectionBox, Perception};

/// What combat monitoring saw first.
#[derive(Debug, Clone, PartialEq)]
enum Sighting {
    Boss,
    Chest(DetectionBox),
}

/// Releases every held key when dropped.
struct ReleaseOnExit<'a>(&'a dyn InputDevice);

impl Drop for ReleaseOnExit<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.0.release_all() {
            tracing::warn!(error = %e, "failed to release keys");
        }
    }
}

/// Unwraps a phase result or skips the rest of the iteration.
macro_rules! proceed {
    ($ctx:expr, $phase:expr) => {
        match $phase? {
            PhaseOutcome::Done(value) => value,
            PhaseOutcome::Skip(reason) => {
                return Ok(IterationOutcome::Skipped {
                    phase: $ctx.phase,
                    reason,
                });
            }
        }
    };
}

pub struct Orchestrator<'a> {
    nav: NavigationContext<'a>,
    diagnostics: &'a dyn Diagnostics,
    cooldown: CooldownTracker,
    prompt: PromptMatcher,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        perception: &'a dyn Perception,
        input: &'a dyn InputDevice,
        diagnostics: &'a dyn Diagnostics,
        config: &'a EncounterConfig,
        cancel: &'a CancelToken,
    ) -> Result<Self> {
        Ok(Self {
            nav: NavigationContext::new(perception, input, config, cancel),
            diagnostics,
            cooldown: CooldownTracker::new(millis(config.cooldown_ms)),
            prompt: PromptMatcher::new(&config.approach.target_patterns)?,
        })
    }

    fn config(&self) -> &'a EncounterConfig {
        self.nav.config
    }

    pub fn cooldown(&self) -> &CooldownTracker {
        &self.cooldown
    }

    /// Runs up to `loop_count` iterations.
    ///
    /// Cancellation comes back as an error satisfying `is_cancellation`.
    /// Any other error is logged with a diagnostic screenshot first.
    pub fn run(&mut self) -> Result<RunSummary> {
        let loops = self.config().loop_count;
        self.diagnostics
            .notify(&format!("Encounter run started: up to {} iterations", loops));

        let result = {
            let _release = ReleaseOnExit(self.nav.input);
            self.run_loop()
        };

        match result {
            Ok(summary) => {
                self.diagnostics.notify(&format!(
                    "Encounter run finished: {} completed, {} skipped",
                    summary.completed, summary.skipped
                ));
                Ok(summary)
            }
            Err(e) if is_cancellation(&e) => {
                tracing::info!("encounter run cancelled");
                Err(e)
            }
            Err(e) => {
                tracing::error!(error = %format!("{:#}", e), "encounter run failed");
                match self.diagnostics.screenshot("encounter_error") {
                    Ok(Some(path)) => {
                        tracing::info!(path = %path.display(), "error screenshot saved")
                    }
                    Ok(None) => {}
                    Err(shot) => tracing::warn!(error = %shot, "could not save error screenshot"),
                }
                self.diagnostics.notify(&format!("Encounter run failed: {}", e));
                Err(e)
            }
        }
    }

    fn run_loop(&mut self) -> Result<RunSummary> {
        let config = self.config();
        let mut summary = RunSummary::default();

        for loop_index in 1..=config.loop_count {
            self.nav.cancel.check()?;
            if loop_index > 1 {
                self.cooldown.wait(self.nav.cancel)?;
            }

            tracing::info!(iteration = loop_index, total = config.loop_count, "iteration started");
            let mut ctx = PhaseContext::new(loop_index);
            let outcome = {
                let _release = ReleaseOnExit(self.nav.input);
                self.run_iteration(&mut ctx)?
            };
            summary.record(&outcome);

            match &outcome {
                IterationOutcome::Complete => {
                    tracing::info!(
                        iteration = loop_index,
                        elapsed_secs = %format!("{:.1}", ctx.elapsed().as_secs_f32()),
                        "iteration complete"
                    );
                }
                IterationOutcome::Skipped { phase, reason } => {
                    tracing::warn!(
                        iteration = loop_index,
                        phase = %phase,
                        reason = %reason,
                        "iteration skipped"
                    );
                    self.nav.sleep_ms(config.timings.skip_delay_ms)?;
                }
            }
        }

        Ok(summary)
    }

    pub fn run_iteration(&mut self, ctx: &mut PhaseContext) -> Result<IterationOutcome> {
        ctx.enter(Phase::MainPage);
        proceed!(ctx, self.main_page());

        ctx.enter(Phase::EnteringArea);
        proceed!(ctx, self.enter_area());

        ctx.enter(Phase::SelectingTarget);
        proceed!(ctx, self.select_target());

        ctx.enter(Phase::Activating);
        proceed!(ctx, self.activate());

        ctx.enter(Phase::Monitoring);
        let sighting = proceed!(ctx, self.monitor());

        let known_chest = match sighting {
            Sighting::Boss => {
                ctx.enter(Phase::AwaitingClear);
                proceed!(ctx, self.await_clear());
                None
            }
            Sighting::Chest(chest) => Some(chest),
        };

        ctx.enter(Phase::Searching);
        let chest = proceed!(ctx, self.search(known_chest));
        ctx.locked_label = Some(chest.label.clone());

        ctx.enter(Phase::Approaching);
        proceed!(ctx, self.approach(&chest));

        ctx.enter(Phase::Interacting);
        proceed!(ctx, self.interact());

        ctx.enter(Phase::ClaimingReward);
        proceed!(ctx, self.claim_reward());

        Ok(IterationOutcome::Complete)
    }

    fn main_page(&self) -> Result<PhaseOutcome> {
        if self.nav.ensure_main_page()? {
            Ok(PhaseOutcome::Done(()))
        } else {
            Ok(PhaseOutcome::Skip("main page not reached".into()))
        }
    }

    fn enter_area(&self) -> Result<PhaseOutcome> {
        let config = self.config();
        tracing::info!("opening map");
        self.nav.tap(config.keys.map, config.timings.click_down_ms)?;
        self.nav.sleep_ms(config.timings.map_open_ms)?;

        let (x, y) = self.nav.scaled(landmarks::WORLD_BOSS_ENTRY)?;
        tracing::info!(x, y, "opening world boss list");
        self.nav.click(x, y)?;
        self.nav.sleep_ms(config.timings.boss_entry_settle_ms)?;
        Ok(PhaseOutcome::Done(()))
    }

    fn select_target(&self) -> Result<PhaseOutcome> {
        let config = self.config();
        if let Some(template) = config.boss.selection_template() {
            tracing::info!(boss = ?config.boss, template, "selecting boss");
            if !self.nav.wait_and_click(
                template,
                config.timeouts.boss_select_ms,
                config.timings.boss_select_settle_ms,
            )? {
                return Ok(PhaseOutcome::Skip(format!("boss entry {} not shown", template)));
            }
        }

        if !self
            .nav
            .wait_and_click(labels::GOTO_BOSS, config.timeouts.gotoboss_ms, 0)?
        {
            return Ok(PhaseOutcome::Skip("travel button not shown".into()));
        }
        Ok(PhaseOutcome::Done(()))
    }

    fn activate(&mut self) -> Result<PhaseOutcome> {
        let config = self.config();
        let timings = &config.timings;

        if !self.nav.wait_and_click(
            labels::SHENLIN,
            config.timeouts.shenlin_ms,
            timings.shenlin_settle_ms,
        )? {
            return Ok(PhaseOutcome::Skip("teleport button not shown".into()));
        }

        tracing::info!("waiting for main view after teleport");
        if !self
            .nav
            .wait_for_main_page_color(config.timeouts.main_page_color_ms)?
        {
            return Ok(PhaseOutcome::Skip("main view did not return after teleport".into()));
        }

        tracing::info!(key = %config.keys.source, "triggering source skill");
        self.nav.tap(config.keys.source, timings.source_hold_ms)?;
        self.nav.sleep_ms(timings.source_settle_ms)?;

        hold_keys(
            self.nav.input,
            self.nav.cancel,
            &[config.keys.forward],
            millis(timings.forward_hold_ms),
        )?;
        self.nav.start_auto_combat()?;
        self.nav.sleep_ms(timings.activate_settle_ms)?;

        self.cooldown.record();
        Ok(PhaseOutcome::Done(()))
    }

    fn monitor(&self) -> Result<PhaseOutcome<Sighting>> {
        let config = self.config();
        let labels = config.tracker.label_refs();
        let deadline = self.nav.deadline(config.timeouts.combat_wait_ms);
        tracing::info!(timeout_secs = config.timeouts.combat_wait_ms / 1000, "monitoring combat");

        loop {
            if self.nav.is_boss_spawned()? {
                tracing::info!("boss spawned");
                return Ok(PhaseOutcome::Done(Sighting::Boss));
            }
            let chest =
                scan_in_order(self.nav.perception, &labels, None, config.tracker.scan_threshold)?;
            if let Some(chest) = chest {
                tracing::info!(label = %chest.label, "chest appeared during combat");
                return Ok(PhaseOutcome::Done(Sighting::Chest(chest)));
            }
            if Instant::now() >= deadline {
                return Ok(PhaseOutcome::Skip("combat monitoring timed out".into()));
            }
            self.nav.sleep_ms(config.timings.monitor_poll_ms)?;
        }
    }

    fn await_clear(&self) -> Result<PhaseOutcome> {
        let config = self.config();
        let deadline = self.nav.deadline(config.timeouts.boss_clear_ms);
        let mut clear = ConsecutiveConfirm::new(config.timings.clear_confirmations);

        loop {
            let cleared = match self.nav.boss_still_shown()? {
                Some(shown) => clear.observe(!shown),
                None => clear.observe(false),
            };
            if cleared {
                tracing::info!("boss banner cleared");
                return Ok(PhaseOutcome::Done(()));
            }
            if Instant::now() >= deadline {
                return Ok(PhaseOutcome::Skip("boss banner did not clear".into()));
            }
            self.nav.sleep_ms(config.timings.clear_poll_ms)?;
        }
    }

    fn search(&self, known: Option<DetectionBox>) -> Result<PhaseOutcome<DetectionBox>> {
        let config = self.config();
        self.nav.start_auto_combat()?;

        if let Some(chest) = known {
            return Ok(PhaseOutcome::Done(chest));
        }

        let mut tracker = TargetTracker::new(self.nav.perception, self.nav.cancel, &config.tracker);
        if let Some(chest) = tracker.wait_for_any(millis(config.timeouts.chest_wait_ms))? {
            return Ok(PhaseOutcome::Done(chest));
        }

        tracing::info!("no chest in view, searching");
        let search = ParallelSearch::new(
            self.nav.perception,
            self.nav.input,
            &config.keys,
            self.nav.cancel,
            config.tracker.label_refs(),
            &config.search,
        );
        match search.search()? {
            Some(chest) => Ok(PhaseOutcome::Done(chest)),
            None => Ok(PhaseOutcome::Skip("no chest found".into())),
        }
    }

    fn approach(&self, chest: &DetectionBox) -> Result<PhaseOutcome> {
        let config = self.config();
        let mut tracker = TargetTracker::with_target(
            self.nav.perception,
            self.nav.cancel,
            &config.tracker,
            chest,
        );
        let mut steering = SteeringController::new(config.steering.clone());
        let mut arrived = StabilityDebouncer::new(millis(config.approach.stable_ms));
        let deadline = self.nav.deadline(config.approach.walk_timeout_ms);
        tracing::info!(label = %chest.label, center = ?chest.center(), "approaching chest");

        while Instant::now() < deadline {
            self.nav.cancel.check()?;

            let shown = self.nav.prompt_shown(&self.prompt)?;
            if arrived.observe(Instant::now(), shown) {
                tracing::info!("interaction prompt stable");
                return Ok(PhaseOutcome::Done(()));
            }
            if shown {
                // Hold still while the prompt settles
                self.nav.sleep_ms(config.timings.approach_poll_ms)?;
                continue;
            }

            let Some(frame) = self.nav.frame()? else {
                self.nav.sleep_ms(config.timings.approach_poll_ms)?;
                continue;
            };

            match tracker.track(None)? {
                TrackOutcome::Found(target) | TrackOutcome::Reacquired(target) => {
                    let centered = steering.step(
                        self.nav.input,
                        &config.keys,
                        self.nav.cancel,
                        target.center(),
                        frame.width(),
                        frame.height(),
                    )?;
                    tracing::trace!(centered, "steered toward chest");
                }
                TrackOutcome::Missed { misses } => {
                    tracing::trace!(misses, "chest not visible");
                    self.nav.sleep_ms(config.timings.approach_poll_ms)?;
                }
                TrackOutcome::Lost => {
                    return Ok(PhaseOutcome::Skip("lost track of chest".into()));
                }
            }
        }

        Ok(PhaseOutcome::Skip("interaction prompt not reached".into()))
    }

    fn interact(&self) -> Result<PhaseOutcome> {
        let config = self.config();
        let timings = &config.timings;
        self.nav.sleep_ms(timings.interact_settle_ms)?;

        if !self.nav.character_state_normal()? && !self.nav.recover_character_state()? {
            return Ok(PhaseOutcome::Skip("avatar state did not recover".into()));
        }

        let deadline = self.nav.deadline(config.timeouts.interact_ms);
        while Instant::now() < deadline {
            self.nav.tap(config.keys.interact, timings.interact_tap_ms)?;
            for label in labels::OPEN_CHEST {
                if let Some(button) = self.nav.find_one(label, config.thresholds.open_chest)? {
                    tracing::info!(label, "opening chest");
                    self.nav.click_box(&button)?;
                    self.nav.sleep_ms(timings.open_chest_settle_ms)?;
                    return Ok(PhaseOutcome::Done(()));
                }
            }
            self.nav.sleep_ms(timings.interact_poll_ms)?;
        }

        Ok(PhaseOutcome::Skip("chest did not open".into()))
    }

    fn claim_reward(&self) -> Result<PhaseOutcome> {
        let (x, y) = self.nav.scaled(landmarks::REWARD)?;
        tracing::info!(x, y, "claiming reward");
        self.nav.click(x, y)?;
        self.nav.sleep_ms(self.config().timings.reward_settle_ms)?;
        Ok(PhaseOutcome::Done(()))
    }
}
