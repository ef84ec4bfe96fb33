pub mod bridge;
pub mod classifier;
pub mod commands;
pub mod debounce;
pub mod extension;
pub mod latch;
pub mod results;
pub mod scheduler;
pub mod settings;
pub mod utils;
pub mod video;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use log::{info, warn, LevelFilter};
use tokio::time::{self, Instant, MissedTickBehavior};

pub use bridge::ResultBridge;
pub use classifier::{Classifier, MeanColorClassifier};
pub use commands::{ClassificationInterval, CommandOutcome, RunningState};
pub use debounce::ActionDebouncer;
pub use extension::Extension;
pub use latch::{EdgeLatch, EdgeSignal, HoldMode};
pub use results::{ClassificationResult, RankedLabel, ResultError, ResultStore};
pub use scheduler::{ClassificationScheduler, InFlightPolicy, OverlapPolicy, SchedulerOptions};
pub use settings::Settings;
pub use video::{Frame, SyntheticCamera, VideoError, VideoIo, VideoState};

/// The block engine steps at 30 frames per second.
const ENGINE_TICK: Duration = Duration::from_millis(33);
const RUN_SECS_ENV: &str = "IC2SCRATCH_RUN_SECS";
const DEFAULT_RUN_SECS: u64 = 10;

/// Runs the extension against the synthetic camera with a stand-in engine
/// loop, until the run time elapses or Ctrl-C.
pub async fn run() -> Result<()> {
    let level = if settings::debug_mode() {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    utils::init_logging(level);

    info!("ic2scratch starting up...");

    let settings = Settings::from_env()?;
    let run_for = run_duration()?;

    let extension = Extension::new(
        Arc::new(SyntheticCamera::new(video::FRAME_WIDTH, video::FRAME_HEIGHT)),
        Arc::new(MeanColorClassifier::new()),
        settings,
    );
    extension.initialize().await?;

    let outcome = drive_engine(&extension, run_for).await;

    extension.shutdown().await?;
    let stats = extension.scheduler().stats();
    info!(
        "ran {} classifications ({} failed, {} skipped)",
        stats.successes, stats.failures, stats.cycles_skipped
    );
    outcome
}

fn run_duration() -> Result<Duration> {
    let secs = match std::env::var(RUN_SECS_ENV) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{RUN_SECS_ENV} must be a whole number of seconds"))?,
        Err(_) => DEFAULT_RUN_SECS,
    };
    Ok(Duration::from_secs(secs))
}

/// Polls the hat every engine tick. While it reads true the script reads the
/// rank getters; each result is reported once. Halfway through it switches to
/// the fastest interval.
async fn drive_engine(extension: &Extension, run_for: Duration) -> Result<()> {
    let started = Instant::now();
    let mut ticker = time::interval(ENGINE_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut reconfigured = false;
    let mut last_reported = None;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted, shutting down");
                break;
            }
            _ = ticker.tick() => {
                let elapsed = started.elapsed();
                if elapsed >= run_for {
                    break;
                }

                if !reconfigured && elapsed >= run_for / 2 {
                    reconfigured = true;
                    let outcome = extension.set_classification_interval("0.5")?;
                    info!("classification interval set to 0.5s: {outcome:?}");
                }

                if !extension.when_received() {
                    continue;
                }
                let classified_at = extension.latest().map(|result| result.classified_at());
                if classified_at != last_reported {
                    report_results(extension);
                    last_reported = classified_at;
                }
            }
        }
    }
    Ok(())
}

fn report_results(extension: &Extension) {
    let ranked: Vec<String> = (1..=3)
        .map(|rank| match (extension.result(rank), extension.confidence(rank)) {
            (Ok(label), Ok(confidence)) => format!("{rank}. {label} ({confidence:.2})"),
            (Err(err), _) | (_, Err(err)) => {
                warn!("result {rank} unavailable: {err}");
                format!("{rank}. -")
            }
        })
        .collect();
    info!("received: {}", ranked.join(", "));
}
