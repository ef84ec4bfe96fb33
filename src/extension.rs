use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use anyhow::{Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    bridge::ResultBridge,
    classifier::Classifier,
    commands::{ClassificationInterval, CommandGate, CommandKind, CommandOutcome, RunningState},
    latch::EdgeLatch,
    results::{ClassificationResult, ResultError},
    scheduler::ClassificationScheduler,
    settings::Settings,
    video::{apply_video_state, VideoIo, VideoState},
};

/// The image-classifier extension as the block engine sees it: a hat
/// predicate, rank getters, and three debounced commands.
pub struct Extension {
    settings: Settings,
    video: Arc<dyn VideoIo>,
    classifier: Arc<dyn Classifier>,
    bridge: Arc<ResultBridge>,
    scheduler: ClassificationScheduler,
    gate: CommandGate,
    sweeper_token: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Extension {
    pub fn new(
        video: Arc<dyn VideoIo>,
        classifier: Arc<dyn Classifier>,
        settings: Settings,
    ) -> Self {
        let latch = EdgeLatch::new(
            Duration::from_millis(settings.latch.hold_ms),
            settings.latch.mode,
        );
        let bridge = Arc::new(ResultBridge::new(latch));
        let scheduler = ClassificationScheduler::new(
            Arc::clone(&video),
            Arc::clone(&classifier),
            Arc::clone(&bridge),
            settings.scheduler.options(),
            Duration::from_millis(settings.scheduler.interval_ms),
        );
        let gate = CommandGate::new(
            Duration::from_millis(settings.debounce.cooldown_ms),
            settings.debounce.scope,
        );

        Self {
            settings,
            video,
            classifier,
            bridge,
            scheduler,
            gate,
            sweeper_token: CancellationToken::new(),
            sweeper: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn scheduler(&self) -> &ClassificationScheduler {
        &self.scheduler
    }

    pub fn bridge(&self) -> &Arc<ResultBridge> {
        &self.bridge
    }

    /// Switches the camera on, loads the model, then starts classifying.
    pub async fn initialize(&self) -> Result<()> {
        if self.settings.video.enable_on_start {
            self.video.enable().context("failed to enable video")?;
            self.video.set_mirror(self.settings.video.mirror);
        }

        self.classifier
            .warm_up()
            .await
            .context("classifier failed to load")?;
        info!("Model loaded");

        {
            let mut sweeper = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
            if sweeper.is_none() {
                *sweeper = Some(self.bridge.spawn_sweeper(
                    Duration::from_millis(self.settings.latch.sweep_interval_ms),
                    self.sweeper_token.clone(),
                ));
            }
        }

        if self.settings.start_on_load {
            self.scheduler.start(self.settings.scheduler.interval_ms)?;
        }
        Ok(())
    }

    /// Hat predicate, polled once per engine tick.
    pub fn when_received(&self) -> bool {
        self.bridge.poll()
    }

    pub fn result(&self, rank: usize) -> Result<String, ResultError> {
        self.bridge.label(rank)
    }

    pub fn confidence(&self, rank: usize) -> Result<f64, ResultError> {
        self.bridge.confidence(rank)
    }

    pub fn latest(&self) -> Option<Arc<ClassificationResult>> {
        self.bridge.latest()
    }

    pub fn toggle_classification(&self, value: &str) -> Result<CommandOutcome> {
        if self.gate.should_suppress(CommandKind::ToggleClassification) {
            return Ok(CommandOutcome::Suppressed);
        }

        match value.parse::<RunningState>()? {
            RunningState::On => self.scheduler.resume()?,
            RunningState::Off => self.scheduler.stop(),
        }
        Ok(CommandOutcome::Applied)
    }

    /// Changing the interval also switches classification on.
    pub fn set_classification_interval(&self, value: &str) -> Result<CommandOutcome> {
        if self.gate.should_suppress(CommandKind::SetClassificationInterval) {
            return Ok(CommandOutcome::Suppressed);
        }

        let interval = value.parse::<ClassificationInterval>()?;
        self.scheduler.reconfigure_interval(interval.as_millis())?;
        Ok(CommandOutcome::Applied)
    }

    pub fn video_toggle(&self, value: &str) -> Result<CommandOutcome> {
        if self.gate.should_suppress(CommandKind::VideoToggle) {
            return Ok(CommandOutcome::Suppressed);
        }

        let state = value.parse::<VideoState>()?;
        apply_video_state(self.video.as_ref(), state)?;
        info!("video turned {state:?}");
        Ok(CommandOutcome::Applied)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.scheduler.shutdown().await?;

        self.sweeper_token.cancel();
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = sweeper {
            handle.await.context("latch sweeper failed to join")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classifier::MeanColorClassifier,
        settings::DebounceScope,
        video::SyntheticCamera,
    };
    use tokio::time;

    fn extension(settings: Settings) -> (Extension, Arc<SyntheticCamera>) {
        let camera = Arc::new(SyntheticCamera::new(8, 6));
        let extension = Extension::new(
            Arc::clone(&camera) as Arc<dyn VideoIo>,
            Arc::new(MeanColorClassifier::new()),
            settings,
        );
        (extension, camera)
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn initialize_enables_video_and_starts_classifying() {
        let (extension, camera) = extension(Settings::default());
        extension.initialize().await.unwrap();

        assert!(camera.is_enabled());
        assert!(camera.is_mirrored());
        assert!(extension.scheduler().is_running());
        assert!(extension.result(1).is_err());

        extension.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn start_on_load_can_be_disabled() {
        let mut settings = Settings::default();
        settings.start_on_load = false;
        let (extension, _camera) = extension(settings);
        extension.initialize().await.unwrap();

        assert!(!extension.scheduler().is_running());
        extension.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn rapid_repeat_of_a_command_is_suppressed() {
        let (extension, _camera) = extension(Settings::default());
        extension.initialize().await.unwrap();

        assert_eq!(
            extension.toggle_classification("off").unwrap(),
            CommandOutcome::Applied
        );
        assert!(!extension.scheduler().is_running());

        time::advance(ms(100)).await;
        assert_eq!(
            extension.toggle_classification("on").unwrap(),
            CommandOutcome::Suppressed
        );
        assert!(!extension.scheduler().is_running());

        time::advance(ms(300)).await;
        assert_eq!(
            extension.toggle_classification("on").unwrap(),
            CommandOutcome::Applied
        );
        assert!(extension.scheduler().is_running());

        extension.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn setting_the_interval_restarts_classification() {
        let (extension, _camera) = extension(Settings::default());
        extension.initialize().await.unwrap();
        extension.toggle_classification("off").unwrap();

        time::advance(ms(300)).await;
        assert_eq!(
            extension.set_classification_interval("0.5").unwrap(),
            CommandOutcome::Applied
        );
        assert!(extension.scheduler().is_running());
        assert_eq!(extension.scheduler().interval(), ms(500));

        time::advance(ms(300)).await;
        extension.toggle_classification("off").unwrap();
        time::advance(ms(300)).await;
        extension.toggle_classification("on").unwrap();
        assert_eq!(extension.scheduler().interval(), ms(500));

        extension.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn video_commands_reach_the_device() {
        let mut settings = Settings::default();
        settings.debounce.scope = DebounceScope::PerCommand;
        let (extension, camera) = extension(settings);
        extension.initialize().await.unwrap();

        extension.video_toggle("on-mirrored").unwrap();
        assert!(camera.is_enabled());
        assert!(!camera.is_mirrored());

        time::advance(ms(300)).await;
        extension.video_toggle("off").unwrap();
        assert!(!camera.is_enabled());

        time::advance(ms(300)).await;
        assert!(extension.video_toggle("upside-down").is_err());

        extension.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn invalid_menu_value_changes_nothing() {
        let (extension, _camera) = extension(Settings::default());
        extension.initialize().await.unwrap();

        assert!(extension.set_classification_interval("3").is_err());
        assert_eq!(extension.scheduler().interval(), ms(1_000));
        assert_eq!(extension.scheduler().stats().timers_cancelled, 0);

        extension.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn commands_can_come_from_the_engine_thread() {
        let (extension, _camera) = extension(Settings::default());
        extension.initialize().await.unwrap();
        let extension = Arc::new(extension);

        let engine = Arc::clone(&extension);
        let outcome = std::thread::spawn(move || engine.set_classification_interval("2"))
            .join()
            .expect("engine thread finished")
            .unwrap();

        assert_eq!(outcome, CommandOutcome::Applied);
        assert!(extension.scheduler().is_running());
        assert_eq!(extension.scheduler().interval(), ms(2_000));
        assert_eq!(extension.scheduler().stats().active_timers(), 1);

        extension.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn classified_frames_reach_the_getters() {
        let (extension, _camera) = extension(Settings::default());
        extension.initialize().await.unwrap();

        time::sleep(ms(1_050)).await;
        assert!(extension.when_received());
        for rank in 1..=3 {
            assert!(extension.result(rank).is_ok());
            let confidence = extension.confidence(rank).unwrap();
            assert!((0.0..=1.0).contains(&confidence));
        }
        assert!(extension.result(4).is_err());

        extension.shutdown().await.unwrap();
    }
}
