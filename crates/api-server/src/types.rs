//! API request and response types

use mood_tracker_emotion_detection::PredictionResult;
use serde::{Deserialize, Serialize};

/// Greeting served at `/`
pub const ROOT_MESSAGE: &str = "Mood Tracker API Active";

/// Multipart field carrying the uploaded image
pub const UPLOAD_FIELD: &str = "file";

/// Prediction for an uploaded image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    /// Emotion label, or "No Face"
    pub emotion: String,
    /// Percentage in `[0, 100]`, 2 decimals
    pub confidence: f64,
}

impl From<PredictionResult> for PredictResponse {
    fn from(result: PredictionResult) -> Self {
        Self {
            emotion: result.emotion,
            confidence: result.confidence,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// API version
    pub version: String,
}

/// Error body for 4xx and 5xx responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}
