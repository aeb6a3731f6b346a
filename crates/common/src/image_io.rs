//! Image decoding and color conversion used at pipeline ingress
//!
//! Uploaded bytes are decoded with the `image` crate (format sniffed from the
//! content, never from a filename) and normalized to 8-bit RGB. Grayscale
//! conversion uses the BT.601 luma weights in 14-bit fixed point, the same
//! arithmetic OpenCV applies for `COLOR_RGB2GRAY`, so cascade thresholds trained
//! against OpenCV-converted images see identical intensities.

use crate::{ProcessingError, Result};
use image::{GrayImage, Luma, RgbImage};
use std::path::Path;
use tracing::debug;

const R_WEIGHT: u32 = 4899;
const G_WEIGHT: u32 = 9617;
const B_WEIGHT: u32 = 1868;
const SHIFT: u32 = 14;

/// Decode an in-memory image of any supported format into RGB
///
/// # Errors
/// Returns `ProcessingError::DecodeError` if the bytes are not a decodable image
/// and `ProcessingError::EmptyImage` if the decoded image has no pixels.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage> {
    let img = image::load_from_memory(bytes)?;
    let rgb = img.to_rgb8();
    ensure_non_empty(rgb.width(), rgb.height())?;
    debug!("Decoded {}x{} image ({} bytes)", rgb.width(), rgb.height(), bytes.len());
    Ok(rgb)
}

/// Load an image file from disk into RGB
pub fn load_rgb<P: AsRef<Path>>(path: P) -> Result<RgbImage> {
    let bytes = std::fs::read(path.as_ref())?;
    decode_rgb(&bytes)
}

/// Convert RGB to single-channel grayscale with BT.601 weights
#[must_use]
pub fn rgb_to_gray(image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut gray = GrayImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let luma = (u32::from(r) * R_WEIGHT
            + u32::from(g) * G_WEIGHT
            + u32::from(b) * B_WEIGHT
            + (1 << (SHIFT - 1)))
            >> SHIFT;
        gray.put_pixel(x, y, Luma([luma.min(255) as u8]));
    }
    gray
}

fn ensure_non_empty(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(ProcessingError::EmptyImage { width, height });
    }
    Ok(())
}
