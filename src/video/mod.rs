pub mod synthetic;

use std::{str::FromStr, sync::Arc};

use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use synthetic::SyntheticCamera;

pub const FRAME_WIDTH: u32 = 480;
pub const FRAME_HEIGHT: u32 = 360;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("video is disabled")]
    Disabled,
    #[error("capture device unavailable: {0}")]
    Unavailable(String),
}

/// Shared handle to one captured frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: Arc<DynamicImage>,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image: Arc::new(image),
            captured_at: Utc::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// The capture device the scheduler pulls frames from. Implementations own
/// the device; the scheduler and the command surface only issue these calls.
pub trait VideoIo: Send + Sync {
    fn enable(&self) -> Result<(), VideoError>;
    fn disable(&self);
    fn set_mirror(&self, mirror: bool);
    fn current_frame(&self) -> Result<Frame, VideoError>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum VideoState {
    Off,
    On,
    /// Menu value `on-mirrored`: the picture is mirrored relative to `On`,
    /// which is already the selfie view, so the device's mirror flag goes
    /// *off*. `on-flipped` is accepted for the same choice.
    #[serde(alias = "on-flipped")]
    OnMirrored,
}

impl VideoState {
    /// Mirror flag to apply, `None` when the device is being switched off.
    /// A mirrored picture is the natural "selfie" view, so plain `On` mirrors
    /// and `OnMirrored` shows the raw camera orientation.
    pub fn mirror(self) -> Option<bool> {
        match self {
            VideoState::Off => None,
            VideoState::On => Some(true),
            VideoState::OnMirrored => Some(false),
        }
    }
}

impl FromStr for VideoState {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value.trim() {
            "off" => Ok(VideoState::Off),
            "on" => Ok(VideoState::On),
            "on-mirrored" | "on-flipped" => Ok(VideoState::OnMirrored),
            other => Err(anyhow::anyhow!("unknown video state '{other}'")),
        }
    }
}

/// Applies a video menu choice to the device.
pub fn apply_video_state(video: &dyn VideoIo, state: VideoState) -> anyhow::Result<()> {
    match state.mirror() {
        None => video.disable(),
        Some(mirror) => {
            video.enable()?;
            video.set_mirror(mirror);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_values_parse() {
        assert_eq!("off".parse::<VideoState>().unwrap(), VideoState::Off);
        assert_eq!("on".parse::<VideoState>().unwrap(), VideoState::On);
        assert_eq!(
            "on-mirrored".parse::<VideoState>().unwrap(),
            VideoState::OnMirrored
        );
        assert_eq!(
            "on-flipped".parse::<VideoState>().unwrap(),
            VideoState::OnMirrored
        );
        assert!("sideways".parse::<VideoState>().is_err());
    }

    #[test]
    fn serde_uses_menu_spelling() {
        let state: VideoState = serde_json::from_str("\"on-flipped\"").unwrap();
        assert_eq!(state, VideoState::OnMirrored);
        assert_eq!(
            serde_json::to_string(&VideoState::OnMirrored).unwrap(),
            "\"on-mirrored\""
        );
        assert_eq!(serde_json::to_string(&VideoState::On).unwrap(), "\"on\"");
    }

    #[test]
    fn apply_video_state_drives_the_device() {
        let camera = SyntheticCamera::new(8, 8);

        apply_video_state(&camera, VideoState::Off).unwrap();
        assert!(!camera.is_enabled());
        assert!(matches!(camera.current_frame(), Err(VideoError::Disabled)));

        apply_video_state(&camera, VideoState::OnMirrored).unwrap();
        assert!(camera.is_enabled());
        assert!(!camera.is_mirrored());

        apply_video_state(&camera, VideoState::On).unwrap();
        assert!(camera.is_mirrored());
    }
}
