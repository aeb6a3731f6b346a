//! Remote prediction through the backend API

use anyhow::Result;
use clap::Args;
use mood_tracker_cli::display::{emoji_label, format_confidence, format_delta, is_celebration};
use mood_tracker_cli::{ClientError, PredictClient, RemoteOutcome, DEFAULT_BACKEND_URL};
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct PredictCommand {
    /// Image to classify
    #[arg(value_name = "IMAGE")]
    image: PathBuf,

    /// Prediction endpoint
    #[arg(long, env = "BACKEND_URL", default_value = DEFAULT_BACKEND_URL)]
    backend_url: String,
}

impl PredictCommand {
    pub async fn execute(self) -> Result<()> {
        info!("Backend: {}", self.backend_url);
        let client = PredictClient::new(self.backend_url);

        match client.predict_file(&self.image).await {
            Ok(RemoteOutcome::Prediction(prediction)) => {
                println!("PREDICTED EMOTION: {}", emoji_label(&prediction.emotion));
                println!(
                    "CONFIDENCE:        {} ({})",
                    format_confidence(prediction.confidence),
                    format_delta(prediction.confidence)
                );
                if is_celebration(&prediction.emotion) {
                    println!("🎈🎈🎈 Keep smiling! 🎈🎈🎈");
                }
                Ok(())
            }
            Ok(RemoteOutcome::ServerError { status, body }) => {
                eprintln!("⚠️ Server Error: {body}");
                anyhow::bail!("Backend returned HTTP {status}")
            }
            Err(ClientError::Connection(e)) => {
                eprintln!("❌ Connection Failed.");
                eprintln!("Error Details: {e}");
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }
}
