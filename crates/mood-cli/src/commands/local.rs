//! In-process prediction, no server involved

use anyhow::{Context as _, Result};
use clap::{ArgGroup, Args};
use mood_tracker_cli::display::{emoji_label, format_confidence};
use mood_tracker_common::image_io::load_rgb;
use mood_tracker_emotion_detection::{
    Classifier, Emotion, EmotionPipeline, NativeCnn, OnnxClassifier, OnnxClassifierConfig,
};
use mood_tracker_face_detection::{
    CascadeConfig, HaarFaceDetector, DEFAULT_MIN_NEIGHBORS, DEFAULT_SCALE_FACTOR,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Args)]
#[command(group(ArgGroup::new("model").required(true).args(["onnx", "weights"])))]
pub struct LocalCommand {
    /// Image to classify
    #[arg(value_name = "IMAGE")]
    image: PathBuf,

    /// Haar cascade XML file
    #[arg(long, default_value = "models/haarcascade_frontalface_default.xml")]
    cascade: PathBuf,

    /// Exported ONNX emotion model
    #[arg(long)]
    onnx: Option<PathBuf>,

    /// Native network weights (safetensors)
    #[arg(long)]
    weights: Option<PathBuf>,

    /// Apply softmax to the ONNX output
    #[arg(long)]
    softmax: bool,

    /// Cascade pyramid scale factor
    #[arg(long, default_value_t = DEFAULT_SCALE_FACTOR)]
    scale_factor: f64,

    /// Raw hits a face needs to be kept
    #[arg(long, default_value_t = DEFAULT_MIN_NEIGHBORS)]
    min_neighbors: usize,

    /// Print the full result as JSON
    #[arg(long)]
    json: bool,
}

impl LocalCommand {
    pub fn execute(self) -> Result<()> {
        let pipeline = self.build_pipeline()?;
        let image = load_rgb(&self.image)
            .with_context(|| format!("Failed to load {}", self.image.display()))?;
        info!("Loaded {}x{} image", image.width(), image.height());

        let detailed = pipeline.predict_detailed(&image)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&detailed)?);
            return Ok(());
        }

        println!("Emotion:    {}", emoji_label(&detailed.result.emotion));
        println!("Confidence: {}", format_confidence(detailed.result.confidence));
        match detailed.face {
            Some(face) => println!(
                "Face:       x={} y={} {}x{} (first of {})",
                face.x, face.y, face.width, face.height, detailed.faces_found
            ),
            None => println!("Face:       none found"),
        }
        if let Some(distribution) = &detailed.distribution {
            println!("Distribution:");
            for emotion in Emotion::ALL {
                println!(
                    "  {:<9} {:6.2}%",
                    emotion.as_str(),
                    distribution.probability(emotion) * 100.0
                );
            }
        }
        Ok(())
    }

    fn build_pipeline(&self) -> Result<EmotionPipeline> {
        let config = CascadeConfig {
            scale_factor: self.scale_factor,
            min_neighbors: self.min_neighbors,
            ..Default::default()
        };
        let detector = HaarFaceDetector::new(&self.cascade, config)
            .with_context(|| format!("Failed to load cascade {}", self.cascade.display()))?;

        let classifier: Arc<dyn Classifier> = match (&self.onnx, &self.weights) {
            (Some(model), _) => Arc::new(OnnxClassifier::new(
                model,
                OnnxClassifierConfig {
                    apply_softmax: self.softmax,
                },
            )?),
            (None, Some(weights)) => Arc::new(NativeCnn::from_safetensors_file(weights)?),
            (None, None) => anyhow::bail!("Either --onnx or --weights is required"),
        };

        Ok(EmotionPipeline::new(Arc::new(detector), classifier))
    }
}
