use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use chrono::Utc;
use tokio::{
    sync::Notify,
    time::{self, Duration, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{bridge::ResultBridge, classifier::Classifier, video::VideoIo};

use super::{OverlapPolicy, SchedulerStats};

// Set to false to silence per-cycle logging from this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Everything one classification cycle touches.
#[derive(Clone)]
pub(crate) struct CycleContext {
    pub video: Arc<dyn VideoIo>,
    pub classifier: Arc<dyn Classifier>,
    pub bridge: Arc<ResultBridge>,
    pub stats: Arc<SchedulerStats>,
    pub in_flight: Arc<InFlight>,
    pub classify_timeout: Duration,
}

/// Counts dispatched cycles across every timer the scheduler has run, so a
/// replacement timer still sees calls left over from the one before it.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(Arc::clone(self))
    }

    /// Resolves once no cycle is running.
    async fn wait_idle(&self) {
        loop {
            // Registered before the check so a guard dropped in between still wakes us.
            let idle = self.idle.notified();
            if self.count() == 0 {
                return;
            }
            idle.await;
        }
    }
}

struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Repeating timer. The first tick fires one `period` after start.
///
/// `timer_token` stops the ticking; `cycle_token` is what dispatched cycles
/// watch, so the caller decides whether stopping the timer also drops them.
/// Under `Queue` the loop waits for every running cycle, including ones a
/// replaced timer left behind, before it dispatches, and stays responsive to
/// `timer_token` while it waits.
pub(crate) async fn classification_loop(
    ctx: CycleContext,
    period: Duration,
    overlap: OverlapPolicy,
    timer_token: CancellationToken,
    cycle_token: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = timer_token.cancelled() => {
                log_info!("classification timer ({}ms) shutting down", period.as_millis());
                break;
            }
            _ = ticker.tick() => {
                match overlap {
                    OverlapPolicy::Skip if ctx.in_flight.count() > 0 => {
                        ctx.stats.cycle_skipped();
                        log_debug!("previous classification still running, skipping tick");
                        continue;
                    }
                    OverlapPolicy::Queue if ctx.in_flight.count() > 0 => {
                        log_debug!("previous classification still running, waiting for it");
                        tokio::select! {
                            biased;
                            _ = timer_token.cancelled() => {
                                log_info!("classification timer ({}ms) shutting down", period.as_millis());
                                break;
                            }
                            _ = ctx.in_flight.wait_idle() => {}
                        }
                    }
                    _ => {}
                }

                ctx.stats.cycle_dispatched();
                let guard = ctx.in_flight.enter();
                let cycle = tokio::spawn(run_cycle_until_cancelled(
                    ctx.clone(),
                    cycle_token.clone(),
                    guard,
                ));

                if overlap == OverlapPolicy::Queue {
                    // Dropping the handle detaches the cycle; `cycle_token` decides its fate.
                    tokio::select! {
                        biased;
                        _ = timer_token.cancelled() => {
                            log_info!("classification timer ({}ms) shutting down", period.as_millis());
                            break;
                        }
                        _ = cycle => {}
                    }
                }
            }
        }
    }
}

async fn run_cycle_until_cancelled(
    ctx: CycleContext,
    cancel_token: CancellationToken,
    _guard: InFlightGuard,
) {
    tokio::select! {
        biased;
        _ = cancel_token.cancelled() => {
            ctx.stats.cycle_cancelled();
            log_info!("in-flight classification dropped");
        }
        _ = run_cycle(&ctx) => {}
    }
}

/// One frame through the classifier. Failures are logged and counted; they
/// never touch the published result or the latch.
async fn run_cycle(ctx: &CycleContext) {
    let cycle_start = Instant::now();

    let frame = match ctx.video.current_frame() {
        Ok(frame) => frame,
        Err(err) => {
            ctx.stats.failure();
            log_warn!("no frame to classify: {err}");
            return;
        }
    };

    let captured_at = frame.captured_at;
    match time::timeout(ctx.classify_timeout, ctx.classifier.classify(frame)).await {
        Ok(Ok(results)) => {
            let top = results
                .top()
                .map(|entry| format!("{} ({:.2})", entry.label, entry.confidence))
                .unwrap_or_else(|| "<empty>".to_string());
            ctx.bridge.publish(results);
            ctx.stats.success();
            log_debug!(
                "classified in {}ms (frame age {}ms), top: {top}",
                cycle_start.elapsed().as_millis(),
                (Utc::now() - captured_at).num_milliseconds()
            );
        }
        Ok(Err(err)) => {
            ctx.stats.failure();
            log_error!("classification failed: {err:?}");
        }
        Err(_) => {
            ctx.stats.failure();
            log_warn!(
                "classification timeout (> {}ms)",
                ctx.classify_timeout.as_millis()
            );
        }
    }
}
