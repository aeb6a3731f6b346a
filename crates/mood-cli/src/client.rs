//! HTTP client for the prediction backend

use mood_tracker_emotion_detection::PredictionResult;
use reqwest::multipart::{Form, Part};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Backend used when neither `--backend-url` nor `BACKEND_URL` is given
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000/predict";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to read image {path}: {source}")]
    ReadImage {
        path: String,
        source: std::io::Error,
    },

    /// Transport failure or unreadable response; never retried
    #[error("Connection failed: {0}")]
    Connection(#[from] reqwest::Error),
}

/// Backend answer to an upload
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOutcome {
    Prediction(PredictionResult),
    /// Non-200 response with its raw body
    ServerError { status: u16, body: String },
}

pub struct PredictClient {
    http: reqwest::Client,
    url: String,
}

impl PredictClient {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Upload an image file as multipart field `file`
    pub async fn predict_file(&self, path: &Path) -> Result<RemoteOutcome, ClientError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ClientError::ReadImage {
                path: path.display().to_string(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map_or_else(|| "image.jpg".to_string(), |n| n.to_string_lossy().into_owned());
        self.predict_bytes(bytes, file_name).await
    }

    pub async fn predict_bytes(
        &self,
        bytes: Vec<u8>,
        file_name: String,
    ) -> Result<RemoteOutcome, ClientError> {
        debug!("Uploading {} bytes to {}", bytes.len(), self.url);
        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name));
        let response = self.http.post(&self.url).multipart(form).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::OK {
            Ok(RemoteOutcome::Prediction(response.json().await?))
        } else {
            Ok(RemoteOutcome::ServerError {
                status: status.as_u16(),
                body: response.text().await?,
            })
        }
    }
}
