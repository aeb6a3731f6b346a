//! Training dataset sanity check

use anyhow::Result;
use clap::Args;
use mood_tracker_cli::dataset::{inspect_folder, DatasetError};
use std::path::PathBuf;

#[derive(Args)]
pub struct InspectDatasetCommand {
    /// Training data root, one subfolder per emotion
    #[arg(long, default_value = "data/train")]
    train_dir: PathBuf,

    /// Emotion subfolder to check
    #[arg(long, default_value = "happy")]
    emotion: String,
}

impl InspectDatasetCommand {
    pub fn execute(self) -> Result<()> {
        match inspect_folder(&self.train_dir, &self.emotion) {
            Ok(summary) => {
                println!(
                    "✅ Found {} images in {} folder.",
                    summary.image_count, self.emotion
                );
                match summary.first_dimensions {
                    Some((w, h)) => println!(
                        "Sample: {} ({}x{})",
                        summary.first_sample.display(),
                        w,
                        h
                    ),
                    None => println!(
                        "Sample: {} (not a readable image)",
                        summary.first_sample.display()
                    ),
                }
                Ok(())
            }
            Err(DatasetError::Empty(folder)) => {
                println!("⚠️ The folder '{}' exists but is empty.", folder.display());
                Ok(())
            }
            Err(DatasetError::NotFound { expected }) => {
                eprintln!("❌ ERROR: Could not find the folder. Check your path!");
                eprintln!("Expected to find: {}", expected.display());
                anyhow::bail!("Dataset folder missing")
            }
            Err(e) => Err(e.into()),
        }
    }
}
