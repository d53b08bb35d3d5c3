//! Facial emotion classifier using the FER+ ONNX model.
//!
//! FER+ takes a 64x64 grayscale face crop and scores eight emotions. There is
//! no separate face detector: the classifier looks at the centre square of
//! the frame and reports nothing when the crop is flat (lens covered, lights
//! off) or the model is unsure.

#[cfg(feature = "ferplus")]
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Value,
};
use image::imageops::{self, FilterType};
use std::path::PathBuf;

use super::classifier::{ClassifierError, EmotionClassifier, EmotionSample};
use super::Frame;

/// FER+ input edge length
pub const INPUT_SIZE: u32 = 64;

/// Output order of the FER+ model, in the classifier's label vocabulary
pub const FERPLUS_LABELS: [&str; 8] = [
    "neutral", "happy", "surprise", "sad", "angry", "disgust", "fear", "contempt",
];

/// Configuration for the FER+ classifier
#[derive(Debug, Clone)]
pub struct FerPlusConfig {
    /// Path to the FER+ ONNX model
    pub model_path: PathBuf,
    /// Number of threads for ONNX inference
    pub n_threads: i32,
    /// Below this top probability the frame counts as "no detection"
    pub min_confidence: f32,
    /// Crops with a luma standard deviation under this are treated as empty
    pub min_contrast: f32,
}

impl Default for FerPlusConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::new(),
            n_threads: 1,
            min_confidence: 0.3,
            min_contrast: 4.0,
        }
    }
}

/// Centre square crop, grayscale, resized to 64x64, as raw 0-255 floats
pub fn preprocess(frame: &Frame) -> Result<Vec<f32>, ClassifierError> {
    let mut luma = frame
        .to_luma()
        .ok_or_else(|| ClassifierError::InvalidInput("Frame buffer size mismatch".to_string()))?;

    let (w, h) = luma.dimensions();
    if w == 0 || h == 0 {
        return Err(ClassifierError::InvalidInput("Empty frame".to_string()));
    }

    let side = w.min(h);
    let crop = imageops::crop(&mut luma, (w - side) / 2, (h - side) / 2, side, side).to_image();
    let resized = imageops::resize(&crop, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);

    Ok(resized.pixels().map(|p| p.0[0] as f32).collect())
}

/// Standard deviation of the pixel values
pub fn contrast(pixels: &[f32]) -> f32 {
    if pixels.is_empty() {
        return 0.0;
    }
    let n = pixels.len() as f32;
    let mean = pixels.iter().sum::<f32>() / n;
    let var = pixels.iter().map(|p| (p - mean).powi(2)).sum::<f32>() / n;
    var.sqrt()
}

/// Softmax the raw scores and label them. Returns empty when the best
/// probability is under `min_confidence`.
pub fn label_scores(logits: &[f32], min_confidence: f32) -> Vec<EmotionSample> {
    if logits.len() < FERPLUS_LABELS.len() {
        tracing::warn!("Unexpected output shape from emotion model: {}", logits.len());
        return Vec::new();
    }

    let logits = &logits[..FERPLUS_LABELS.len()];
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();

    let samples: Vec<EmotionSample> = FERPLUS_LABELS
        .iter()
        .zip(exps)
        .map(|(label, e)| EmotionSample::new(*label, e / sum))
        .collect();

    let best = samples.iter().map(|s| s.score).fold(0.0, f32::max);
    if best < min_confidence {
        tracing::debug!("Emotion below confidence floor ({:.2} < {:.2})", best, min_confidence);
        return Vec::new();
    }
    samples
}

/// FER+ emotion classifier
#[cfg(feature = "ferplus")]
pub struct FerPlusClassifier {
    session: Session,
    config: FerPlusConfig,
}

#[cfg(feature = "ferplus")]
impl FerPlusClassifier {
    /// Load the model
    pub fn new(config: FerPlusConfig) -> Result<Self, ClassifierError> {
        if !config.model_path.exists() {
            return Err(ClassifierError::ModelLoadError(format!(
                "Model not found at {:?}",
                config.model_path
            )));
        }

        let session = Session::builder()
            .map_err(|e: ort::Error| ClassifierError::ModelLoadError(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e: ort::Error| ClassifierError::ModelLoadError(e.to_string()))?
            .with_intra_threads(config.n_threads as usize)
            .map_err(|e: ort::Error| ClassifierError::ModelLoadError(e.to_string()))?
            .commit_from_file(&config.model_path)
            .map_err(|e: ort::Error| ClassifierError::ModelLoadError(e.to_string()))?;

        tracing::info!(
            "Emotion classifier initialized with model: {:?}",
            config.model_path
        );

        Ok(Self { session, config })
    }
}

#[cfg(feature = "ferplus")]
impl EmotionClassifier for FerPlusClassifier {
    fn classify(&mut self, frame: &Frame) -> Result<Vec<EmotionSample>, ClassifierError> {
        let pixels = preprocess(frame)?;

        let spread = contrast(&pixels);
        if spread < self.config.min_contrast {
            tracing::debug!("Frame too flat for a face (contrast {:.1})", spread);
            return Ok(Vec::new());
        }

        // FER+ expects [batch, channel, height, width]
        let input_shape = [1_usize, 1, INPUT_SIZE as usize, INPUT_SIZE as usize];
        let input_tensor = Value::from_array((input_shape, pixels))
            .map_err(|e: ort::Error| ClassifierError::InferenceError(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e: ort::Error| ClassifierError::InferenceError(e.to_string()))?;

        let output = outputs
            .iter()
            .next()
            .ok_or_else(|| ClassifierError::InferenceError("No output from model".to_string()))?;

        let output_tensor = output
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e: ort::Error| ClassifierError::InferenceError(e.to_string()))?;

        let logits: Vec<f32> = output_tensor.1.iter().copied().collect();
        let samples = label_scores(&logits, self.config.min_confidence);

        if let Some(top) = super::classifier::dominant(&samples) {
            tracing::trace!("Emotion detected: {}", top.overlay_text());
        }
        Ok(samples)
    }
}

// Stub implementation when feature is not enabled
#[cfg(not(feature = "ferplus"))]
pub struct FerPlusClassifier;

#[cfg(not(feature = "ferplus"))]
impl FerPlusClassifier {
    pub fn new(_config: FerPlusConfig) -> Result<Self, ClassifierError> {
        Err(ClassifierError::FeatureNotEnabled)
    }
}

#[cfg(not(feature = "ferplus"))]
impl EmotionClassifier for FerPlusClassifier {
    fn classify(&mut self, _frame: &Frame) -> Result<Vec<EmotionSample>, ClassifierError> {
        Err(ClassifierError::FeatureNotEnabled)
    }
}
