pub mod mean_color;

use anyhow::Result;
use async_trait::async_trait;

use crate::{results::ClassificationResult, video::Frame};

pub use mean_color::MeanColorClassifier;

/// An image model. Results are ranked best first; the block engine reads the
/// top three.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Loads whatever the model needs before the first `classify`.
    async fn warm_up(&self) -> Result<()> {
        Ok(())
    }

    async fn classify(&self, frame: Frame) -> Result<ClassificationResult>;
}
