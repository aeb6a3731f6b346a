//! Training dataset folder inspection
//!
//! Training images live in `<train_dir>/<emotion>/`, one folder per class.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Could not find the folder {}", .expected.display())]
    NotFound { expected: PathBuf },

    #[error("The folder '{}' exists but is empty", .0.display())]
    Empty(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What was found in one class folder
#[derive(Debug, Clone, PartialEq)]
pub struct FolderSummary {
    pub folder: PathBuf,
    pub image_count: usize,
    /// First file in name order
    pub first_sample: PathBuf,
    /// `(width, height)` when the first sample is a readable image
    pub first_dimensions: Option<(u32, u32)>,
}

/// Count the files in `<train_dir>/<emotion>` and look at the first one
pub fn inspect_folder(train_dir: &Path, emotion: &str) -> Result<FolderSummary, DatasetError> {
    let folder = train_dir.join(emotion);
    if !folder.is_dir() {
        let expected = std::path::absolute(&folder).unwrap_or_else(|_| folder.clone());
        return Err(DatasetError::NotFound { expected });
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(&folder)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();

    let Some(first_sample) = files.first().cloned() else {
        return Err(DatasetError::Empty(folder));
    };
    let first_dimensions = match image::image_dimensions(&first_sample) {
        Ok(dims) => Some(dims),
        Err(e) => {
            debug!("Could not read {}: {}", first_sample.display(), e);
            None
        }
    };

    Ok(FolderSummary {
        folder,
        image_count: files.len(),
        first_sample,
        first_dimensions,
    })
}
