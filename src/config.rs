//! Run configuration.
//!
//! Loaded once from config.json next to the executable (or the path named by
//! `QRSL_CONFIG`) and passed down as an immutable value. Every field has a
//! default, so a partial file only overrides what it names.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::control::{SearchConfig, SteeringConfig, TrackerConfig};
use crate::input::KeyBindings;
use crate::vision::TemplateSettings;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "QRSL_CONFIG";

pub fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

/// Which world boss to challenge. The matching map must already be active.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BossChoice {
    /// Robarag / Zhuyan, the map's default selection.
    #[default]
    RobaragZhuyan,
    Apophis,
}

impl BossChoice {
    /// Template to click on the boss list, if the choice needs one.
    pub fn selection_template(self) -> Option<&'static str> {
        match self {
            BossChoice::RobaragZhuyan => None,
            BossChoice::Apophis => Some("Apophis"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApproachConfig {
    /// Prompt texts that mean the avatar is standing at the chest.
    pub target_patterns: Vec<String>,
    /// How long a match must persist.
    pub stable_ms: u64,
    pub walk_timeout_ms: u64,
}

impl Default for ApproachConfig {
    fn default() -> Self {
        Self {
            target_patterns: vec!["太极匣".to_string(), "高级密码箱".to_string()],
            stable_ms: 500,
            walk_timeout_ms: 60_000,
        }
    }
}

/// Per-phase limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseTimeouts {
    pub main_page_ms: u64,
    pub exit_confirm_ms: u64,
    pub boss_select_ms: u64,
    pub gotoboss_ms: u64,
    pub shenlin_ms: u64,
    pub main_page_color_ms: u64,
    /// Combat monitoring before giving up on the boss.
    pub combat_wait_ms: u64,
    pub boss_clear_ms: u64,
    /// Short look for a chest before falling back to a search.
    pub chest_wait_ms: u64,
    pub interact_ms: u64,
}

impl Default for PhaseTimeouts {
    fn default() -> Self {
        Self {
            main_page_ms: 120_000,
            exit_confirm_ms: 10_000,
            boss_select_ms: 10_000,
            gotoboss_ms: 30_000,
            shenlin_ms: 30_000,
            main_page_color_ms: 60_000,
            combat_wait_ms: 900_000,
            boss_clear_ms: 600_000,
            chest_wait_ms: 5_000,
            interact_ms: 10_000,
        }
    }
}

/// Fixed pauses and key hold times.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    pub feature_poll_ms: u64,
    pub main_page_settle_ms: u64,
    pub back_settle_ms: u64,
    pub escape_settle_ms: u64,
    pub exit_settle_ms: u64,
    pub map_open_ms: u64,
    pub boss_entry_settle_ms: u64,
    pub boss_select_settle_ms: u64,
    pub shenlin_settle_ms: u64,
    pub main_page_poll_ms: u64,
    pub source_hold_ms: u64,
    pub source_settle_ms: u64,
    pub forward_hold_ms: u64,
    pub auto_combat_settle_ms: u64,
    pub activate_settle_ms: u64,
    pub monitor_poll_ms: u64,
    pub clear_poll_ms: u64,
    /// Consecutive clear reads that confirm the boss banner is gone.
    pub clear_confirmations: u32,
    pub approach_poll_ms: u64,
    pub interact_settle_ms: u64,
    pub recover_attempts: u32,
    pub recover_hold_ms: u64,
    pub recover_settle_ms: u64,
    pub interact_tap_ms: u64,
    pub interact_poll_ms: u64,
    pub open_chest_settle_ms: u64,
    pub reward_settle_ms: u64,
    pub skip_delay_ms: u64,
    /// Modifier held before a UI click.
    pub modifier_down_ms: u64,
    /// Pause after the click before the modifier is released.
    pub modifier_release_ms: u64,
    pub click_down_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            feature_poll_ms: 500,
            main_page_settle_ms: 3000,
            back_settle_ms: 500,
            escape_settle_ms: 1000,
            exit_settle_ms: 8000,
            map_open_ms: 2000,
            boss_entry_settle_ms: 2000,
            boss_select_settle_ms: 1000,
            shenlin_settle_ms: 8000,
            main_page_poll_ms: 500,
            source_hold_ms: 500,
            source_settle_ms: 200,
            forward_hold_ms: 2500,
            auto_combat_settle_ms: 5000,
            activate_settle_ms: 1000,
            monitor_poll_ms: 2000,
            clear_poll_ms: 2000,
            clear_confirmations: 2,
            approach_poll_ms: 50,
            interact_settle_ms: 2000,
            recover_attempts: 20,
            recover_hold_ms: 200,
            recover_settle_ms: 200,
            interact_tap_ms: 50,
            interact_poll_ms: 100,
            open_chest_settle_ms: 1000,
            reward_settle_ms: 7000,
            skip_delay_ms: 5000,
            modifier_down_ms: 200,
            modifier_release_ms: 500,
            click_down_ms: 10,
        }
    }
}

impl Timings {
    /// Near-zero pauses for tests.
    #[cfg(test)]
    pub fn instant() -> Self {
        Self {
            feature_poll_ms: 1,
            main_page_settle_ms: 0,
            back_settle_ms: 0,
            escape_settle_ms: 0,
            exit_settle_ms: 0,
            map_open_ms: 0,
            boss_entry_settle_ms: 0,
            boss_select_settle_ms: 0,
            shenlin_settle_ms: 0,
            main_page_poll_ms: 1,
            source_hold_ms: 0,
            source_settle_ms: 0,
            forward_hold_ms: 0,
            auto_combat_settle_ms: 0,
            activate_settle_ms: 0,
            monitor_poll_ms: 1,
            clear_poll_ms: 1,
            clear_confirmations: 2,
            approach_poll_ms: 1,
            interact_settle_ms: 0,
            recover_attempts: 3,
            recover_hold_ms: 0,
            recover_settle_ms: 0,
            interact_tap_ms: 0,
            interact_poll_ms: 1,
            open_chest_settle_ms: 0,
            reward_settle_ms: 0,
            skip_delay_ms: 0,
            modifier_down_ms: 0,
            modifier_release_ms: 0,
            click_down_ms: 0,
        }
    }
}

/// Template-match thresholds for UI elements.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub ui: f32,
    pub back: f32,
    pub open_chest: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            ui: 0.7,
            back: 0.75,
            open_chest: 0.6,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EncounterConfig {
    pub keys: KeyBindings,
    /// Maximum number of iterations.
    pub loop_count: u32,
    pub boss: BossChoice,
    pub tracker: TrackerConfig,
    pub steering: SteeringConfig,
    pub search: SearchConfig,
    pub approach: ApproachConfig,
    /// Minimum time between two activations.
    pub cooldown_ms: u64,
    pub timeouts: PhaseTimeouts,
    pub timings: Timings,
    pub thresholds: Thresholds,
    pub templates: TemplateSettings,
    /// How long one captured frame is shared between perception queries.
    pub frame_max_age_ms: u64,
    /// Tesseract language for the interaction prompt.
    pub ocr_language: String,
}

impl Default for EncounterConfig {
    fn default() -> Self {
        Self {
            keys: KeyBindings::default(),
            loop_count: 10_000,
            boss: BossChoice::default(),
            tracker: TrackerConfig::default(),
            steering: SteeringConfig::default(),
            search: SearchConfig::default(),
            approach: ApproachConfig::default(),
            cooldown_ms: 60_000,
            timeouts: PhaseTimeouts::default(),
            timings: Timings::default(),
            thresholds: Thresholds::default(),
            templates: TemplateSettings::default(),
            frame_max_age_ms: 80,
            ocr_language: "chi_sim".to_string(),
        }
    }
}

/// `QRSL_CONFIG` if set, else config.json next to the executable.
pub fn resolve_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    crate::paths::get_exe_dir().join("config.json")
}

pub fn load_config(path: &Path) -> Result<EncounterConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Loads the config, falling back to defaults when it is missing or broken.
pub fn load_or_default(path: &Path) -> EncounterConfig {
    tracing::info!(path = %path.display(), "looking for config");

    if !path.exists() {
        tracing::info!("config file not found, using defaults");
        return EncounterConfig::default();
    }

    match load_config(path) {
        Ok(config) => {
            tracing::info!("config loaded");
            config
        }
        Err(e) => {
            tracing::warn!(error = %format!("{:#}", e), "using default config");
            EncounterConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::SearchPattern;
    use crate::input::Key;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EncounterConfig::default();
        assert_eq!(config.loop_count, 10_000);
        assert_eq!(config.cooldown_ms, 60_000);
        assert_eq!(config.timeouts.combat_wait_ms, 900_000);
        assert_eq!(config.tracker.miss_limit, 5);
        assert_eq!(config.approach.stable_ms, 500);
        assert_eq!(config.frame_max_age_ms, 80);
        assert_eq!(config.boss.selection_template(), None);
        assert_eq!(BossChoice::Apophis.selection_template(), Some("Apophis"));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "loop_count": 3,
                "boss": "apophis",
                "search": {{ "pattern": "star" }},
                "keys": {{ "source": "z" }},
                "steering": {{ "fine_hold_ms": 150 }}
            }}"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.loop_count, 3);
        assert_eq!(config.boss, BossChoice::Apophis);
        assert_eq!(config.search.pattern, SearchPattern::Star);
        assert_eq!(config.search.timeout_ms, 60_000);
        assert_eq!(config.keys.source, Key::Char('z'));
        assert_eq!(config.keys.forward, Key::Char('w'));
        assert_eq!(config.steering.fine_hold_ms, 150);
        assert_eq!(config.steering.coarse_hold_ms, 1000);
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(load_config(file.path()).is_err());
        let config = load_or_default(file.path());
        assert_eq!(config.loop_count, 10_000);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_or_default(&dir.path().join("config.json"));
        assert_eq!(config.ocr_language, "chi_sim");
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "keys": {{ "map": "ctrl" }} }}"#).unwrap();
        assert!(load_config(file.path()).is_err());
    }
}
