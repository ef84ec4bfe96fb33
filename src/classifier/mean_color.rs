use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::{
    results::{ClassificationResult, RankedLabel},
    video::Frame,
};

use super::Classifier;

const LABELS: [&str; 3] = ["red", "green", "blue"];

/// Labels a frame by its dominant colour channel. Confidence is each
/// channel's share of the summed channel means.
#[derive(Debug, Default, Clone)]
pub struct MeanColorClassifier;

impl MeanColorClassifier {
    pub fn new() -> Self {
        Self
    }
}

fn channel_means(frame: &Frame) -> [f64; 3] {
    let rgb = frame.image.to_rgb8();
    let pixels = (rgb.width() as f64 * rgb.height() as f64).max(1.0);

    let mut sums = [0f64; 3];
    for pixel in rgb.pixels() {
        for (sum, value) in sums.iter_mut().zip(pixel.0) {
            *sum += value as f64;
        }
    }
    sums.map(|sum| sum / pixels)
}

fn rank_channels(means: [f64; 3]) -> Result<ClassificationResult> {
    let total: f64 = means.iter().sum();
    let entries = LABELS
        .iter()
        .zip(means)
        .map(|(label, mean)| {
            let confidence = if total > 0.0 { mean / total } else { 1.0 / 3.0 };
            RankedLabel::new(*label, confidence)
        })
        .collect();

    ClassificationResult::new(entries).context("mean colour produced an invalid ranking")
}

#[async_trait]
impl Classifier for MeanColorClassifier {
    async fn classify(&self, frame: Frame) -> Result<ClassificationResult> {
        let means = tokio::task::spawn_blocking(move || channel_means(&frame))
            .await
            .context("mean colour worker join failed")?;
        rank_channels(means)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    fn solid(color: [u8; 3]) -> Frame {
        Frame::new(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            4,
            4,
            Rgb(color),
        )))
    }

    #[tokio::test(flavor = "current_thread")]
    async fn dominant_channel_ranks_first() {
        let result = MeanColorClassifier::new()
            .classify(solid([10, 200, 40]))
            .await
            .unwrap();

        let labels: Vec<_> = result.entries().iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, ["green", "blue", "red"]);
        let total: f64 = result.entries().iter().map(|e| e.confidence).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn black_frame_splits_confidence_evenly() {
        let result = MeanColorClassifier::new()
            .classify(solid([0, 0, 0]))
            .await
            .unwrap();

        assert_eq!(result.len(), 3);
        assert_eq!(result.top().unwrap().label, "red");
        assert!((result.top().unwrap().confidence - 1.0 / 3.0).abs() < 1e-9);
    }
}
