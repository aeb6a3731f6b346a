//! Mood Tracker CLI - facial emotion prediction from the terminal

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

use commands::inspect::InspectDatasetCommand;
use commands::local::LocalCommand;
use commands::predict::PredictCommand;

#[derive(Parser)]
#[command(
    name = "mood-tracker",
    version,
    about = "Facial emotion prediction",
    after_help = "EXAMPLES:\n  \
                  # Ask a running server\n  \
                  mood-tracker predict face.jpg\n  \
                  BACKEND_URL=http://host:8000/predict mood-tracker predict face.jpg\n\n  \
                  # Run the pipeline in-process\n  \
                  mood-tracker local face.jpg --onnx models/emotion_model.onnx\n  \
                  mood-tracker local face.jpg --weights models/emotion_model.safetensors\n\n  \
                  # Check a training folder\n  \
                  mood-tracker inspect-dataset --train-dir data/train --emotion happy"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Send an image to the prediction server
    Predict(PredictCommand),

    /// Predict locally with a cascade and model on disk
    Local(LocalCommand),

    /// Count the images in a training folder
    InspectDataset(InspectDatasetCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Predict(cmd) => cmd.execute().await,
        Commands::Local(cmd) => cmd.execute(),
        Commands::InspectDataset(cmd) => cmd.execute(),
    }
}
