//! Emotion classifier backed by ONNX Runtime
//!
//! Expects the Keras network exported to ONNX (e.g. with `tf2onnx`): a single
//! NHWC input of shape `(1, 48, 48, 1)` and a single output of 7 values.

use crate::{Classifier, EmotionDetectionError, EmotionDistribution, NormalizedFaceTensor};
use anyhow::{Context, Result};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// ONNX classifier configuration
#[derive(Debug, Clone, Default)]
pub struct OnnxClassifierConfig {
    /// Apply softmax to the model output (for exports without the final activation)
    pub apply_softmax: bool,
}

/// Emotion classifier using ONNX Runtime
///
/// `Session::run` needs exclusive access, so concurrent callers are serialized
/// on the session mutex.
pub struct OnnxClassifier {
    session: Mutex<Session>,
    config: OnnxClassifierConfig,
    input_name: String,
}

impl OnnxClassifier {
    /// Create new classifier from ONNX model file
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        config: OnnxClassifierConfig,
    ) -> Result<Self, EmotionDetectionError> {
        let model_path = model_path.as_ref();
        info!("Loading emotion model from {}", model_path.display());
        Self::load(model_path, config)
            .map_err(|e| EmotionDetectionError::ModelLoadError(format!("{e:#}")))
    }

    fn load(model_path: &Path, config: OnnxClassifierConfig) -> Result<Self> {
        if !model_path.exists() {
            anyhow::bail!("Model file not found: {}", model_path.display());
        }

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .commit_from_file(model_path)
            .context("Failed to load emotion classification model")?;

        let input_name = session
            .inputs
            .first()
            .context("Model has no inputs")?
            .name
            .clone();
        session.outputs.first().context("Model has no outputs")?;

        info!(
            "Emotion model loaded (input: {}, softmax: {})",
            input_name, config.apply_softmax
        );

        Ok(Self {
            session: Mutex::new(session),
            config,
            input_name,
        })
    }

    /// Run inference on a preprocessed input
    fn run_inference(&self, input: &NormalizedFaceTensor) -> Result<Vec<f32>> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("ONNX session mutex poisoned"))?;
        let input_tensor = TensorRef::from_array_view(input.as_array().view())?;
        let outputs = session.run(ort::inputs![&*self.input_name => input_tensor])?;

        let output_tensor = outputs[0].try_extract_tensor::<f32>()?;
        let (_shape, data) = output_tensor;

        Ok(data.to_vec())
    }
}

impl Classifier for OnnxClassifier {
    fn classify(
        &self,
        input: &NormalizedFaceTensor,
    ) -> Result<EmotionDistribution, EmotionDetectionError> {
        let output = self
            .run_inference(input)
            .map_err(|e| EmotionDetectionError::InferenceError(format!("{e:#}")))?;

        let probabilities = if self.config.apply_softmax {
            crate::softmax(&output)
        } else {
            output
        };
        debug!("ONNX output: {:?}", probabilities);

        EmotionDistribution::from_slice(&probabilities)
    }

    fn name(&self) -> &str {
        "onnx"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_load_error() {
        let result = OnnxClassifier::new(
            "/nonexistent/models/emotion_model.onnx",
            OnnxClassifierConfig::default(),
        );
        match result {
            Err(EmotionDetectionError::ModelLoadError(msg)) => {
                assert!(msg.contains("not found"));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("loading a missing model must fail"),
        }
    }

    #[test]
    fn test_config_default_keeps_model_probabilities() {
        assert!(!OnnxClassifierConfig::default().apply_softmax);
    }

    #[test]
    #[ignore] // Run manually with: cargo test -p mood-tracker-emotion-detection onnx -- --ignored --nocapture
    fn test_real_model_outputs_distribution() {
        let model_path = std::env::var("CARGO_MANIFEST_DIR")
            .map(|dir| format!("{dir}/../../models/emotion_model.onnx"))
            .unwrap_or_else(|_| "models/emotion_model.onnx".to_string());

        if !Path::new(&model_path).exists() {
            println!("Model not found at {model_path}, skipping");
            return;
        }

        let classifier = OnnxClassifier::new(&model_path, OnnxClassifierConfig::default())
            .expect("Failed to load model");
        let face = image::GrayImage::from_pixel(48, 48, image::Luma([128]));
        let tensor = NormalizedFaceTensor::from_face(&face).unwrap();
        let dist = classifier.classify(&tensor).expect("Inference failed");
        println!("Distribution: {:?}", dist.probabilities());
        assert!((dist.sum() - 1.0).abs() < 1e-3);
    }
}
