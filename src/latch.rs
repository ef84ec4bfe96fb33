use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

pub const DEFAULT_HOLD_MS: u64 = 100;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HoldMode {
    /// Each poll that reads true pushes the reset `hold` past that poll.
    #[default]
    Rolling,
    /// The first poll that reads true schedules the reset; later reads do
    /// not move it.
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeSignal {
    pub armed: bool,
    pub last_set_at: Option<Instant>,
}

/// Turns a point-in-time completion into a plateau a slower poller cannot miss.
///
/// `set()` raises the signal and the first poll that reads it schedules the
/// reset `hold` later. In rolling mode every further true read moves the reset
/// again. A fresh `set()` clears any pending reset, so a completion that lands
/// while an older plateau is winding down is still observed.
#[derive(Debug, Clone)]
pub struct EdgeLatch {
    hold: Duration,
    mode: HoldMode,
    armed: bool,
    last_set_at: Option<Instant>,
    reset_deadline: Option<Instant>,
}

impl Default for EdgeLatch {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_HOLD_MS), HoldMode::Rolling)
    }
}

impl EdgeLatch {
    pub fn new(hold: Duration, mode: HoldMode) -> Self {
        Self {
            hold,
            mode,
            armed: false,
            last_set_at: None,
            reset_deadline: None,
        }
    }

    pub fn hold(&self) -> Duration {
        self.hold
    }

    pub fn mode(&self) -> HoldMode {
        self.mode
    }

    pub fn signal(&self) -> EdgeSignal {
        EdgeSignal {
            armed: self.armed,
            last_set_at: self.last_set_at,
        }
    }

    pub fn reset_deadline(&self) -> Option<Instant> {
        self.reset_deadline
    }

    pub fn set(&mut self) {
        self.set_at(Instant::now());
    }

    pub fn set_at(&mut self, now: Instant) {
        self.armed = true;
        self.last_set_at = Some(now);
        self.reset_deadline = None;
    }

    pub fn poll(&mut self) -> bool {
        self.poll_at(Instant::now())
    }

    pub fn poll_at(&mut self, now: Instant) -> bool {
        if self.expire_at(now) || !self.armed {
            return false;
        }

        match self.mode {
            HoldMode::Rolling => self.reset_deadline = Some(now + self.hold),
            HoldMode::Fixed => {
                self.reset_deadline.get_or_insert(now + self.hold);
            }
        }
        true
    }

    /// Applies a reset whose deadline has passed. Returns whether it did.
    pub fn expire_at(&mut self, now: Instant) -> bool {
        match self.reset_deadline {
            Some(deadline) if self.armed && now >= deadline => {
                self.armed = false;
                self.reset_deadline = None;
                true
            }
            _ => false,
        }
    }
}
