pub mod controller;
pub mod loop_worker;

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use serde::{Deserialize, Serialize};

pub use controller::ClassificationScheduler;

/// What a tick does while an earlier classification is still running.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Dispatch anyway; calls may run concurrently.
    Allow,
    /// Drop the tick.
    #[default]
    Skip,
    /// The timer waits for the call; late ticks are delayed, not burst.
    Queue,
}

/// What happens to dispatched calls when the timer is stopped or replaced.
/// Shutdown always cancels them.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InFlightPolicy {
    /// Let them complete; a late success still publishes.
    #[default]
    Finish,
    /// Drop them; they never publish.
    Cancel,
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    pub overlap: OverlapPolicy,
    pub in_flight: InFlightPolicy,
    pub classify_timeout: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            overlap: OverlapPolicy::default(),
            in_flight: InFlightPolicy::default(),
            classify_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Default)]
pub struct SchedulerStats {
    timers_started: AtomicU64,
    timers_cancelled: AtomicU64,
    cycles_dispatched: AtomicU64,
    cycles_skipped: AtomicU64,
    cycles_cancelled: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub timers_started: u64,
    pub timers_cancelled: u64,
    pub cycles_dispatched: u64,
    pub cycles_skipped: u64,
    pub cycles_cancelled: u64,
    pub successes: u64,
    pub failures: u64,
}

impl StatsSnapshot {
    pub fn active_timers(&self) -> u64 {
        self.timers_started.saturating_sub(self.timers_cancelled)
    }
}

impl SchedulerStats {
    pub(crate) fn timer_started(&self) {
        self.timers_started.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn timer_cancelled(&self) {
        self.timers_cancelled.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn cycle_dispatched(&self) {
        self.cycles_dispatched.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn cycle_skipped(&self) {
        self.cycles_skipped.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn cycle_cancelled(&self) {
        self.cycles_cancelled.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn success(&self) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn failure(&self) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            timers_started: self.timers_started.load(Ordering::SeqCst),
            timers_cancelled: self.timers_cancelled.load(Ordering::SeqCst),
            cycles_dispatched: self.cycles_dispatched.load(Ordering::SeqCst),
            cycles_skipped: self.cycles_skipped.load(Ordering::SeqCst),
            cycles_cancelled: self.cycles_cancelled.load(Ordering::SeqCst),
            successes: self.successes.load(Ordering::SeqCst),
            failures: self.failures.load(Ordering::SeqCst),
        }
    }
}
