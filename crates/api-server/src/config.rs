//! Server configuration
//!
//! Defaults, then an optional YAML file named by `MOOD_TRACKER_CONFIG`, then
//! environment variable overrides.

use anyhow::{Context, Result};
use mood_tracker_emotion_detection::{
    Classifier, EmotionPipeline, NativeCnn, OnnxClassifier, OnnxClassifierConfig,
};
use mood_tracker_face_detection::{CascadeConfig, HaarFaceDetector};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

pub const CONFIG_ENV: &str = "MOOD_TRACKER_CONFIG";
pub const ADDR_ENV: &str = "API_SERVER_ADDR";
pub const CASCADE_ENV: &str = "MOOD_TRACKER_CASCADE";
pub const MODEL_ENV: &str = "MOOD_TRACKER_MODEL";
pub const BACKEND_ENV: &str = "MOOD_TRACKER_BACKEND";
pub const BODY_LIMIT_ENV: &str = "MOOD_TRACKER_BODY_LIMIT";

pub const DEFAULT_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_CASCADE_PATH: &str = "models/haarcascade_frontalface_default.xml";
pub const DEFAULT_ONNX_MODEL_PATH: &str = "models/emotion_model.onnx";
pub const DEFAULT_NATIVE_MODEL_PATH: &str = "models/emotion_model.safetensors";

/// Default upload limit (10 MiB)
pub const DEFAULT_BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Classifier implementation to load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierBackend {
    /// Exported model run through ONNX Runtime
    #[default]
    Onnx,
    /// Pure-Rust network with safetensors weights
    Native,
}

impl ClassifierBackend {
    #[must_use]
    pub fn default_model_path(self) -> &'static str {
        match self {
            ClassifierBackend::Onnx => DEFAULT_ONNX_MODEL_PATH,
            ClassifierBackend::Native => DEFAULT_NATIVE_MODEL_PATH,
        }
    }
}

impl FromStr for ClassifierBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "onnx" => Ok(ClassifierBackend::Onnx),
            "native" => Ok(ClassifierBackend::Native),
            other => anyhow::bail!("Unknown classifier backend '{other}' (expected onnx or native)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub addr: String,
    /// Haar cascade XML file
    pub cascade_path: PathBuf,
    pub backend: ClassifierBackend,
    /// Model file; the backend's default path when unset
    pub model_path: Option<PathBuf>,
    /// Softmax the ONNX output (models exported without the final activation)
    pub apply_softmax: bool,
    /// Maximum request body size in bytes
    pub body_limit: usize,
    pub cascade: CascadeConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            cascade_path: PathBuf::from(DEFAULT_CASCADE_PATH),
            backend: ClassifierBackend::default(),
            model_path: None,
            apply_softmax: false,
            body_limit: DEFAULT_BODY_LIMIT,
            cascade: CascadeConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from the process environment
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_yaml_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Apply overrides from a variable lookup (the environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(ADDR_ENV) {
            self.addr = addr;
        }
        if let Some(path) = lookup(CASCADE_ENV) {
            self.cascade_path = PathBuf::from(path);
        }
        if let Some(path) = lookup(MODEL_ENV) {
            self.model_path = Some(PathBuf::from(path));
        }
        if let Some(backend) = lookup(BACKEND_ENV) {
            self.backend = backend.parse()?;
        }
        if let Some(limit) = lookup(BODY_LIMIT_ENV) {
            self.body_limit = limit
                .trim()
                .parse()
                .with_context(|| format!("{BODY_LIMIT_ENV} must be a byte count, got '{limit}'"))?;
        }
        Ok(())
    }

    #[must_use]
    pub fn resolved_model_path(&self) -> PathBuf {
        self.model_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.backend.default_model_path()))
    }

    /// Load the cascade and classifier named by this configuration
    pub fn build_pipeline(&self) -> Result<EmotionPipeline> {
        let detector = HaarFaceDetector::new(&self.cascade_path, self.cascade.clone())
            .with_context(|| {
                format!("Failed to load face cascade from {}", self.cascade_path.display())
            })?;

        let model_path = self.resolved_model_path();
        let classifier: Arc<dyn Classifier> = match self.backend {
            ClassifierBackend::Onnx => Arc::new(
                OnnxClassifier::new(
                    &model_path,
                    OnnxClassifierConfig {
                        apply_softmax: self.apply_softmax,
                    },
                )
                .context("Failed to load ONNX emotion model")?,
            ),
            ClassifierBackend::Native => Arc::new(
                NativeCnn::from_safetensors_file(&model_path)
                    .context("Failed to load native emotion weights")?,
            ),
        };

        info!(
            "Pipeline ready (cascade: {}, {:?} model: {})",
            self.cascade_path.display(),
            self.backend,
            model_path.display()
        );
        Ok(EmotionPipeline::new(Arc::new(detector), classifier))
    }
}
