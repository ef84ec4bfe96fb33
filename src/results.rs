use std::{cmp::Ordering, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResultError {
    #[error("no classification result at rank {rank} ({available} available)")]
    OutOfRange { rank: usize, available: usize },
    #[error("confidence {confidence} for label '{label}' is outside [0, 1]")]
    InvalidConfidence { label: String, confidence: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedLabel {
    pub label: String,
    pub confidence: f64,
}

impl RankedLabel {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// One classifier output, best match first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    entries: Vec<RankedLabel>,
    classified_at: DateTime<Utc>,
}

impl ClassificationResult {
    /// Validates confidences and orders entries by descending confidence.
    /// The sort is stable, so entries the classifier already ranked keep their
    /// order on ties.
    pub fn new(mut entries: Vec<RankedLabel>) -> Result<Self, ResultError> {
        if let Some(bad) = entries
            .iter()
            .find(|entry| !(0.0..=1.0).contains(&entry.confidence))
        {
            return Err(ResultError::InvalidConfidence {
                label: bad.label.clone(),
                confidence: bad.confidence,
            });
        }

        entries.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });

        Ok(Self {
            entries,
            classified_at: Utc::now(),
        })
    }

    pub fn entries(&self) -> &[RankedLabel] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn classified_at(&self) -> DateTime<Utc> {
        self.classified_at
    }

    pub fn top(&self) -> Option<&RankedLabel> {
        self.entries.first()
    }

    /// 1-based lookup.
    pub fn rank(&self, rank: usize) -> Option<&RankedLabel> {
        rank.checked_sub(1).and_then(|index| self.entries.get(index))
    }
}

/// Latest published result. Replaced whole, never edited in place.
#[derive(Debug, Default, Clone)]
pub struct ResultStore {
    latest: Option<Arc<ClassificationResult>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, results: ClassificationResult) {
        self.latest = Some(Arc::new(results));
    }

    pub fn latest(&self) -> Option<Arc<ClassificationResult>> {
        self.latest.clone()
    }

    pub fn len(&self) -> usize {
        self.latest.as_ref().map(|result| result.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, rank: usize) -> Result<RankedLabel, ResultError> {
        self.latest
            .as_ref()
            .and_then(|result| result.rank(rank))
            .cloned()
            .ok_or(ResultError::OutOfRange {
                rank,
                available: self.len(),
            })
    }

    pub fn label(&self, rank: usize) -> Result<String, ResultError> {
        self.get(rank).map(|entry| entry.label)
    }

    pub fn confidence(&self, rank: usize) -> Result<f64, ResultError> {
        self.get(rank).map(|entry| entry.confidence)
    }
}
