//! Reconfiguration commands issued from the block engine.
//!
//! Each command arrives as the raw menu value of its block. Every one goes
//! through the debounce gate first; a suppressed command changes nothing.

use std::{
    collections::HashMap,
    str::FromStr,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::{debounce::ActionDebouncer, settings::DebounceScope};

const ENABLE_LOGS: bool = true;

use crate::log_info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    ToggleClassification,
    SetClassificationInterval,
    VideoToggle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandOutcome {
    Applied,
    Suppressed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunningState {
    On,
    Off,
}

impl FromStr for RunningState {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "on" => Ok(RunningState::On),
            "off" => Ok(RunningState::Off),
            other => Err(anyhow!("unknown classification state '{other}'")),
        }
    }
}

/// The interval menu offers 0.5, 1, 2 and 5 seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClassificationInterval {
    #[serde(rename = "0.5")]
    HalfSecond,
    #[serde(rename = "1")]
    OneSecond,
    #[serde(rename = "2")]
    TwoSeconds,
    #[serde(rename = "5")]
    FiveSeconds,
}

impl ClassificationInterval {
    pub const ALL: [ClassificationInterval; 4] = [
        ClassificationInterval::FiveSeconds,
        ClassificationInterval::TwoSeconds,
        ClassificationInterval::OneSecond,
        ClassificationInterval::HalfSecond,
    ];

    pub fn as_millis(self) -> u64 {
        match self {
            ClassificationInterval::HalfSecond => 500,
            ClassificationInterval::OneSecond => 1_000,
            ClassificationInterval::TwoSeconds => 2_000,
            ClassificationInterval::FiveSeconds => 5_000,
        }
    }
}

impl FromStr for ClassificationInterval {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let seconds: f64 = value
            .trim()
            .parse()
            .map_err(|_| anyhow!("classification interval '{value}' is not a number"))?;
        let millis = (seconds * 1_000.0).round();

        Self::ALL
            .into_iter()
            .find(|interval| interval.as_millis() as f64 == millis)
            .ok_or_else(|| {
                anyhow!("classification interval must be 0.5, 1, 2 or 5 seconds, got '{value}'")
            })
    }
}

/// Debounce gate in front of the command surface, either one cooldown for
/// every command or one per command kind.
pub struct CommandGate {
    cooldown: Duration,
    scope: DebounceScope,
    guards: Mutex<HashMap<Option<CommandKind>, ActionDebouncer>>,
}

impl CommandGate {
    pub fn new(cooldown: Duration, scope: DebounceScope) -> Self {
        Self {
            cooldown,
            scope,
            guards: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true when `kind` should be dropped as a repeat.
    pub fn should_suppress(&self, kind: CommandKind) -> bool {
        let key = match self.scope {
            DebounceScope::Shared => None,
            DebounceScope::PerCommand => Some(kind),
        };

        let mut guards = self.guards.lock().unwrap_or_else(PoisonError::into_inner);
        let suppressed = guards
            .entry(key)
            .or_insert_with(|| ActionDebouncer::new(self.cooldown))
            .should_suppress();

        if suppressed {
            log_info!("Please do not repeat triggering this block ({kind:?} suppressed)");
        }
        suppressed
    }
}
