use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_COOLDOWN_MS: u64 = 250;

/// Suppresses an action that is re-triggered within `cooldown` of the
/// previous trigger. Every trigger, suppressed or not, restarts the window.
#[derive(Debug, Clone)]
pub struct ActionDebouncer {
    cooldown: Duration,
    last_action_at: Option<Instant>,
}

impl Default for ActionDebouncer {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_COOLDOWN_MS))
    }
}

impl ActionDebouncer {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_action_at: None,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn last_action_at(&self) -> Option<Instant> {
        self.last_action_at
    }

    pub fn should_suppress(&mut self) -> bool {
        self.should_suppress_at(Instant::now())
    }

    pub fn should_suppress_at(&mut self, now: Instant) -> bool {
        let suppress = self
            .last_action_at
            .map(|previous| now.saturating_duration_since(previous) < self.cooldown)
            .unwrap_or(false);

        self.last_action_at = Some(now);
        suppress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn second_trigger_inside_cooldown_is_suppressed() {
        let t0 = Instant::now();
        let mut debouncer = ActionDebouncer::default();

        assert!(!debouncer.should_suppress_at(t0));
        assert!(debouncer.should_suppress_at(t0 + ms(100)));
        assert!(!debouncer.should_suppress_at(t0 + ms(400)));
    }

    #[test]
    fn rapid_retries_keep_extending_the_window() {
        let t0 = Instant::now();
        let mut debouncer = ActionDebouncer::default();

        assert!(!debouncer.should_suppress_at(t0));
        assert!(debouncer.should_suppress_at(t0 + ms(200)));
        assert!(debouncer.should_suppress_at(t0 + ms(400)));
        assert!(debouncer.should_suppress_at(t0 + ms(600)));
        assert_eq!(debouncer.last_action_at(), Some(t0 + ms(600)));
        assert!(!debouncer.should_suppress_at(t0 + ms(850)));
    }

    #[test]
    fn exact_cooldown_boundary_is_not_suppressed() {
        let t0 = Instant::now();
        let mut debouncer = ActionDebouncer::new(ms(250));

        assert!(!debouncer.should_suppress_at(t0));
        assert!(!debouncer.should_suppress_at(t0 + ms(250)));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn wall_clock_variant_follows_runtime_time() {
        let mut debouncer = ActionDebouncer::default();

        assert!(!debouncer.should_suppress());
        tokio::time::advance(ms(100)).await;
        assert!(debouncer.should_suppress());
        tokio::time::advance(ms(300)).await;
        assert!(!debouncer.should_suppress());
    }
}
