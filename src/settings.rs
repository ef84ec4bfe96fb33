use std::{fs, path::Path, time::Duration};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    debounce::DEFAULT_COOLDOWN_MS,
    latch::{HoldMode, DEFAULT_HOLD_MS},
    scheduler::{InFlightPolicy, OverlapPolicy, SchedulerOptions},
};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

pub const SETTINGS_PATH_ENV: &str = "IC2SCRATCH_SETTINGS";
pub const INTERVAL_ENV: &str = "IC2SCRATCH_INTERVAL_MS";
pub const DEBUG_ENV: &str = "IC2SCRATCH_DEBUG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub interval_ms: u64,
    pub overlap: OverlapPolicy,
    pub in_flight: InFlightPolicy,
    pub classify_timeout_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            overlap: OverlapPolicy::default(),
            in_flight: InFlightPolicy::default(),
            classify_timeout_ms: 10_000,
        }
    }
}

impl SchedulerSettings {
    pub fn options(&self) -> SchedulerOptions {
        SchedulerOptions {
            overlap: self.overlap,
            in_flight: self.in_flight,
            classify_timeout: Duration::from_millis(self.classify_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LatchSettings {
    pub hold_ms: u64,
    pub mode: HoldMode,
    /// Period of the ticker that applies overdue resets between polls.
    pub sweep_interval_ms: u64,
}

impl Default for LatchSettings {
    fn default() -> Self {
        Self {
            hold_ms: DEFAULT_HOLD_MS,
            mode: HoldMode::default(),
            sweep_interval_ms: 25,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DebounceScope {
    /// One cooldown shared by every command.
    #[default]
    Shared,
    PerCommand,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceSettings {
    pub cooldown_ms: u64,
    pub scope: DebounceScope,
}

impl Default for DebounceSettings {
    fn default() -> Self {
        Self {
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            scope: DebounceScope::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    pub enable_on_start: bool,
    pub mirror: bool,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            enable_on_start: true,
            mirror: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scheduler: SchedulerSettings,
    pub latch: LatchSettings,
    pub debounce: DebounceSettings,
    pub video: VideoSettings,
    /// Start classifying as soon as the model has loaded.
    pub start_on_load: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scheduler: SchedulerSettings::default(),
            latch: LatchSettings::default(),
            debounce: DebounceSettings::default(),
            video: VideoSettings::default(),
            start_on_load: true,
        }
    }
}

impl Settings {
    /// Reads the settings file named by `IC2SCRATCH_SETTINGS` (if any) and
    /// applies environment overrides.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(SETTINGS_PATH_ENV).ok();
        let mut settings = match path {
            Some(path) => Self::load(Path::new(&path))?,
            None => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// A missing file yields defaults; a malformed one is logged and ignored.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        Ok(serde_json::from_str(&contents).unwrap_or_else(|err| {
            log_warn!("ignoring malformed settings in {}: {err}", path.display());
            Self::default()
        }))
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(INTERVAL_ENV) {
            self.scheduler.interval_ms = value
                .trim()
                .parse()
                .with_context(|| format!("{INTERVAL_ENV} must be an integer, got '{value}'"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduler.interval_ms == 0 {
            bail!("scheduler.interval_ms must be greater than zero");
        }
        if self.latch.hold_ms == 0 {
            bail!("latch.hold_ms must be greater than zero");
        }
        if self.latch.sweep_interval_ms == 0 {
            bail!("latch.sweep_interval_ms must be greater than zero");
        }
        if self.scheduler.classify_timeout_ms == 0 {
            bail!("scheduler.classify_timeout_ms must be greater than zero");
        }
        Ok(())
    }
}

pub fn debug_mode() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
