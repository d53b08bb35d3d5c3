use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Frame;

/// Errors that can occur during emotion classification
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Failed to load model: {0}")]
    ModelLoadError(String),

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Feature not enabled")]
    FeatureNotEnabled,
}

/// One emotion label with its confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionSample {
    pub label: String,
    /// Confidence in [0, 1]
    pub score: f32,
}

impl EmotionSample {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score: score.clamp(0.0, 1.0),
        }
    }

    /// Overlay text, score to two decimals
    pub fn overlay_text(&self) -> String {
        format!("{}: {:.2}", self.label, self.score)
    }
}

/// Highest-scoring sample; the first one wins a tie
pub fn dominant(samples: &[EmotionSample]) -> Option<&EmotionSample> {
    samples.iter().fold(None, |best: Option<&EmotionSample>, s| match best {
        Some(b) if b.score >= s.score => Some(b),
        _ => Some(s),
    })
}

/// Per-frame emotion detection
pub trait EmotionClassifier {
    /// Scores for the face in `frame`; empty when nothing was detected
    fn classify(&mut self, frame: &Frame) -> Result<Vec<EmotionSample>, ClassifierError>;
}
