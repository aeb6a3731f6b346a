//! Emotion classification of 48x48 grayscale face crops.
//!
//! Classifies faces into 7 emotions (FER-2013 order):
//! - Angry
//! - Disgust
//! - Fear
//! - Happy
//! - Sad
//! - Surprise
//! - Neutral
//!
//! Input: `(1, 48, 48, 1)` tensor with values in `[0, 1]`
//! Output: softmax probabilities over the 7 classes
//!
//! The class order is a contract with the trained model artifact; nothing in
//! the artifact lets it be checked at load time.

pub mod network;
pub mod onnx;
pub mod pipeline;
pub mod preprocess;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use network::NativeCnn;
pub use onnx::{OnnxClassifier, OnnxClassifierConfig};
pub use pipeline::{DetailedPrediction, EmotionPipeline, PipelineError};
pub use preprocess::{normalize, NormalizedFaceTensor, FACE_SIZE};

/// Number of emotion classes produced by the classifier
pub const NUM_CLASSES: usize = 7;

/// Label reported when no face is located
pub const NO_FACE_LABEL: &str = "No Face";

/// Emotion classes supported by the model (FER-2013 order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Emotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    Surprise,
    Neutral,
}

impl Emotion {
    /// All classes in model output order
    pub const ALL: [Emotion; NUM_CLASSES] = [
        Emotion::Angry,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Surprise,
        Emotion::Neutral,
    ];

    /// Get emotion from class index
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Position of this class in the model output
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Get emotion label as string
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Angry => "Angry",
            Emotion::Disgust => "Disgust",
            Emotion::Fear => "Fear",
            Emotion::Happy => "Happy",
            Emotion::Sad => "Sad",
            Emotion::Surprise => "Surprise",
            Emotion::Neutral => "Neutral",
        }
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while loading or running a classifier
#[derive(Debug, Error)]
pub enum EmotionDetectionError {
    #[error("Failed to load model: {0}")]
    ModelLoadError(String),

    #[error("Inference failed: {0}")]
    InferenceError(String),

    #[error("Classifier produced {actual} values, expected {expected}")]
    InvalidOutput { expected: usize, actual: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Probability distribution over the 7 emotion classes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionDistribution {
    probabilities: [f32; NUM_CLASSES],
}

impl EmotionDistribution {
    #[must_use]
    pub fn new(probabilities: [f32; NUM_CLASSES]) -> Self {
        Self { probabilities }
    }

    /// Build from a classifier output vector, which must have exactly 7 entries
    pub fn from_slice(values: &[f32]) -> Result<Self, EmotionDetectionError> {
        let probabilities: [f32; NUM_CLASSES] =
            values
                .try_into()
                .map_err(|_| EmotionDetectionError::InvalidOutput {
                    expected: NUM_CLASSES,
                    actual: values.len(),
                })?;
        Ok(Self { probabilities })
    }

    /// Build from raw scores by applying softmax
    #[must_use]
    pub fn from_logits(logits: &[f32; NUM_CLASSES]) -> Self {
        let probs = softmax(logits);
        let mut probabilities = [0.0; NUM_CLASSES];
        probabilities.copy_from_slice(&probs);
        Self { probabilities }
    }

    #[must_use]
    pub fn probabilities(&self) -> &[f32; NUM_CLASSES] {
        &self.probabilities
    }

    #[must_use]
    pub fn probability(&self, emotion: Emotion) -> f32 {
        self.probabilities[emotion.index()]
    }

    #[must_use]
    pub fn sum(&self) -> f32 {
        self.probabilities.iter().sum()
    }

    /// Highest-probability class; the first index wins ties
    #[must_use]
    pub fn top(&self) -> (Emotion, f32) {
        let mut best = 0;
        for (idx, &p) in self.probabilities.iter().enumerate().skip(1) {
            if p > self.probabilities[best] {
                best = idx;
            }
        }
        (Emotion::ALL[best], self.probabilities[best])
    }
}

/// Final answer returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Emotion label, or [`NO_FACE_LABEL`]
    pub emotion: String,
    /// Top probability as a percentage, rounded to 2 decimals
    pub confidence: f64,
}

impl PredictionResult {
    /// Sentinel returned when no face is located
    #[must_use]
    pub fn no_face() -> Self {
        Self {
            emotion: NO_FACE_LABEL.to_string(),
            confidence: 0.0,
        }
    }

    #[must_use]
    pub fn from_distribution(distribution: &EmotionDistribution) -> Self {
        let (emotion, probability) = distribution.top();
        let percent = f64::from(probability) * 100.0;
        Self {
            emotion: emotion.as_str().to_string(),
            confidence: (percent * 100.0).round() / 100.0,
        }
    }

    #[must_use]
    pub fn is_no_face(&self) -> bool {
        self.emotion == NO_FACE_LABEL
    }
}

/// Turns a normalized face tensor into an emotion distribution
///
/// Implementations run in inference mode and are deterministic for fixed
/// weights.
pub trait Classifier: Send + Sync {
    fn classify(
        &self,
        input: &NormalizedFaceTensor,
    ) -> Result<EmotionDistribution, EmotionDetectionError>;

    /// Short backend name for logs
    fn name(&self) -> &str;
}

/// Apply softmax function to convert logits to probabilities
pub(crate) fn softmax(logits: &[f32]) -> Vec<f32> {
    let max_logit = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let mut exps = Vec::with_capacity(logits.len());
    exps.extend(logits.iter().map(|&x| (x - max_logit).exp()));
    let sum_exps: f32 = exps.iter().sum();
    exps.iter().map(|&x| x / sum_exps).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emotion_from_index() {
        assert_eq!(Emotion::from_index(0), Some(Emotion::Angry));
        assert_eq!(Emotion::from_index(3), Some(Emotion::Happy));
        assert_eq!(Emotion::from_index(6), Some(Emotion::Neutral));
        assert_eq!(Emotion::from_index(7), None);
    }

    #[test]
    fn test_index_three_is_happy() {
        assert_eq!(Emotion::from_index(3).unwrap().as_str(), "Happy");
        assert_eq!(Emotion::Happy.index(), 3);
    }

    #[test]
    fn test_labels_roundtrip_through_index() {
        for (idx, emotion) in Emotion::ALL.iter().enumerate() {
            assert_eq!(emotion.index(), idx);
            assert_eq!(Emotion::from_index(idx), Some(*emotion));
        }
        assert_eq!(Emotion::Surprise.to_string(), "Surprise");
    }

    #[test]
    fn test_softmax() {
        let logits = vec![1.0, 2.0, 3.0];
        let probs = softmax(&logits);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1]);
        assert!(probs[1] > probs[0]);
    }

    #[test]
    fn test_distribution_wrong_length() {
        let err = EmotionDistribution::from_slice(&[0.5, 0.5]).unwrap_err();
        assert!(matches!(
            err,
            EmotionDetectionError::InvalidOutput {
                expected: 7,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_distribution_top_and_sum() {
        let dist = EmotionDistribution::from_slice(&[0.05, 0.05, 0.1, 0.6, 0.1, 0.05, 0.05])
            .unwrap();
        assert_eq!(dist.top().0, Emotion::Happy);
        assert!((dist.sum() - 1.0).abs() < 1e-6);
        assert!((dist.probability(Emotion::Fear) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_distribution_tie_takes_first_index() {
        let dist = EmotionDistribution::new([0.3, 0.3, 0.1, 0.1, 0.1, 0.05, 0.05]);
        assert_eq!(dist.top().0, Emotion::Angry);
    }

    #[test]
    fn test_from_logits_sums_to_one() {
        let dist = EmotionDistribution::from_logits(&[0.1, -2.0, 0.5, 4.0, 1.0, 0.0, 2.0]);
        assert!((dist.sum() - 1.0).abs() < 1e-5);
        assert_eq!(dist.top().0, Emotion::Happy);
    }

    #[test]
    fn test_prediction_rounds_to_two_decimals() {
        let dist = EmotionDistribution::new([0.0, 0.0, 0.0, 0.0, 0.876_543, 0.123_457, 0.0]);
        let result = PredictionResult::from_distribution(&dist);
        assert_eq!(result.emotion, "Sad");
        assert!((result.confidence - 87.65).abs() < 1e-9);
        assert!((0.0..=100.0).contains(&result.confidence));
    }

    #[test]
    fn test_no_face_sentinel_json() {
        let result = PredictionResult::no_face();
        assert!(result.is_no_face());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json, serde_json::json!({"emotion": "No Face", "confidence": 0.0}));
    }
}
