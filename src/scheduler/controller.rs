use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info};
use tokio::{runtime::Handle, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{bridge::ResultBridge, classifier::Classifier, video::VideoIo};

use super::{
    loop_worker::{classification_loop, CycleContext, InFlight},
    InFlightPolicy, SchedulerOptions, SchedulerStats, StatsSnapshot,
};

struct ActiveTimer {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

struct TimerSlot {
    interval: Duration,
    active: Option<ActiveTimer>,
}

/// Owns the repeating classification timer. At most one timer is active;
/// starting again replaces it.
///
/// The timer runs on the Tokio runtime that was current when the scheduler
/// was built, so `start`, `stop` and `reconfigure_interval` may be called from
/// any thread, including a polling engine's own.
#[derive(Clone)]
pub struct ClassificationScheduler {
    video: Arc<dyn VideoIo>,
    classifier: Arc<dyn Classifier>,
    bridge: Arc<ResultBridge>,
    options: SchedulerOptions,
    stats: Arc<SchedulerStats>,
    in_flight: Arc<InFlight>,
    runtime: Option<Handle>,
    shutdown_token: CancellationToken,
    slot: Arc<Mutex<TimerSlot>>,
}

impl ClassificationScheduler {
    pub fn new(
        video: Arc<dyn VideoIo>,
        classifier: Arc<dyn Classifier>,
        bridge: Arc<ResultBridge>,
        options: SchedulerOptions,
        interval: Duration,
    ) -> Self {
        Self {
            video,
            classifier,
            bridge,
            options,
            stats: Arc::new(SchedulerStats::default()),
            in_flight: Arc::new(InFlight::default()),
            runtime: Handle::try_current().ok(),
            shutdown_token: CancellationToken::new(),
            slot: Arc::new(Mutex::new(TimerSlot {
                interval,
                active: None,
            })),
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, TimerSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn options(&self) -> SchedulerOptions {
        self.options
    }

    pub fn interval(&self) -> Duration {
        self.lock_slot().interval
    }

    pub fn is_running(&self) -> bool {
        self.lock_slot().active.is_some()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.count()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Replaces any running timer with one firing every `interval_ms`.
    pub fn start(&self, interval_ms: u64) -> Result<()> {
        let interval = checked_interval(interval_ms)?;
        if self.shutdown_token.is_cancelled() {
            bail!("scheduler has been shut down");
        }
        let runtime = self.runtime()?;

        let mut slot = self.lock_slot();
        if let Some(active) = slot.active.take() {
            self.cancel_timer(active);
        }

        let timer_token = self.shutdown_token.child_token();
        let cycle_token = match self.options.in_flight {
            InFlightPolicy::Cancel => timer_token.clone(),
            InFlightPolicy::Finish => self.shutdown_token.clone(),
        };

        let handle = runtime.spawn(classification_loop(
            self.cycle_context(),
            interval,
            self.options.overlap,
            timer_token.clone(),
            cycle_token,
        ));

        slot.interval = interval;
        slot.active = Some(ActiveTimer {
            handle,
            cancel_token: timer_token,
        });
        self.stats.timer_started();
        info!(
            "classification timer started: every {}ms ({:?} overlap)",
            interval_ms, self.options.overlap
        );
        Ok(())
    }

    /// Restarts at the current interval.
    pub fn resume(&self) -> Result<()> {
        let interval_ms = u64::try_from(self.interval().as_millis())
            .context("classification interval does not fit in u64 milliseconds")?;
        self.start(interval_ms)
    }

    pub fn stop(&self) {
        match self.lock_slot().active.take() {
            Some(active) => {
                self.cancel_timer(active);
                info!("classification timer stopped");
            }
            None => debug!("stop requested with no active classification timer"),
        }
    }

    /// Takes effect from the next tick; an invalid interval leaves the
    /// current timer untouched.
    pub fn reconfigure_interval(&self, interval_ms: u64) -> Result<()> {
        checked_interval(interval_ms)?;
        self.stop();
        self.start(interval_ms)
    }

    /// Cancels the timer and every in-flight cycle, then waits for the timer
    /// task to exit. The scheduler cannot be started again afterwards.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_token.cancel();

        let active = self.lock_slot().active.take();
        if let Some(active) = active {
            self.stats.timer_cancelled();
            active.cancel_token.cancel();
            active
                .handle
                .await
                .context("classification timer task failed to join")?;
        }
        info!("classification scheduler shut down");
        Ok(())
    }

    fn cancel_timer(&self, active: ActiveTimer) {
        active.cancel_token.cancel();
        self.stats.timer_cancelled();
        // The loop watches its token even while a queued call runs, so it
        // exits at its next poll; nothing needs its result.
        drop(active.handle);
    }

    fn runtime(&self) -> Result<Handle> {
        self.runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
            .ok_or_else(|| anyhow!("no Tokio runtime available for the classification timer"))
    }

    fn cycle_context(&self) -> CycleContext {
        CycleContext {
            video: Arc::clone(&self.video),
            classifier: Arc::clone(&self.classifier),
            bridge: Arc::clone(&self.bridge),
            stats: Arc::clone(&self.stats),
            in_flight: Arc::clone(&self.in_flight),
            classify_timeout: self.options.classify_timeout,
        }
    }
}

fn checked_interval(interval_ms: u64) -> Result<Duration> {
    if interval_ms == 0 {
        bail!("classification interval must be greater than zero");
    }
    Ok(Duration::from_millis(interval_ms))
}
