//! Face crop normalization into the classifier input tensor
//!
//! Steps, in order: crop the grayscale image to the face box, resize to
//! 48x48 (bilinear), scale samples by 1/255, add batch and channel axes. The
//! 1/255 scaling must match what the model saw during training.

use crate::EmotionDetectionError;
use image::imageops::{self, FilterType};
use image::GrayImage;
use mood_tracker_face_detection::BoundingBox;
use ndarray::Array4;
use tracing::debug;

/// Side length of the square classifier input
pub const FACE_SIZE: u32 = 48;

/// `(1, 48, 48, 1)` f32 tensor with samples in `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFaceTensor {
    data: Array4<f32>,
}

impl NormalizedFaceTensor {
    /// Expected tensor shape `(batch, height, width, channels)`
    pub const SHAPE: [usize; 4] = [1, FACE_SIZE as usize, FACE_SIZE as usize, 1];

    /// Wrap an existing array, checking shape and value range
    pub fn from_array(data: Array4<f32>) -> Result<Self, EmotionDetectionError> {
        if data.shape() != Self::SHAPE {
            return Err(EmotionDetectionError::InvalidInput(format!(
                "Expected tensor shape {:?}, got {:?}",
                Self::SHAPE,
                data.shape()
            )));
        }
        if data.iter().any(|v| !(0.0..=1.0).contains(v)) {
            return Err(EmotionDetectionError::InvalidInput(
                "Tensor values must lie in [0, 1]".to_string(),
            ));
        }
        Ok(Self { data })
    }

    /// Convert a 48x48 grayscale face into the normalized tensor
    pub fn from_face(face: &GrayImage) -> Result<Self, EmotionDetectionError> {
        if face.dimensions() != (FACE_SIZE, FACE_SIZE) {
            return Err(EmotionDetectionError::InvalidInput(format!(
                "Face must be {FACE_SIZE}x{FACE_SIZE}, got {}x{}",
                face.width(),
                face.height()
            )));
        }

        let mut data = Array4::zeros(Self::SHAPE);
        for (x, y, pixel) in face.enumerate_pixels() {
            data[[0, y as usize, x as usize, 0]] = f32::from(pixel.0[0]) / 255.0;
        }
        Ok(Self { data })
    }

    #[must_use]
    pub fn as_array(&self) -> &Array4<f32> {
        &self.data
    }

    #[must_use]
    pub fn into_array(self) -> Array4<f32> {
        self.data
    }

    /// Sample at row `y`, column `x`
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[[0, y, x, 0]]
    }
}

/// Crop the grayscale image to the face box
///
/// The box is intersected with the image bounds first; a box with no overlap
/// is rejected.
pub fn crop_face(gray: &GrayImage, bbox: &BoundingBox) -> Result<GrayImage, EmotionDetectionError> {
    let clamped = bbox.clamp_to(gray.width(), gray.height()).ok_or_else(|| {
        EmotionDetectionError::InvalidInput(format!(
            "Face box {bbox:?} lies outside the {}x{} image",
            gray.width(),
            gray.height()
        ))
    })?;
    if clamped != *bbox {
        debug!("Face box {:?} clamped to {:?}", bbox, clamped);
    }

    Ok(imageops::crop_imm(
        gray,
        clamped.x as u32,
        clamped.y as u32,
        clamped.width as u32,
        clamped.height as u32,
    )
    .to_image())
}

/// Resize a face crop to 48x48; a crop that is already 48x48 is returned as is
#[must_use]
pub fn resize_face(crop: &GrayImage) -> GrayImage {
    if crop.dimensions() == (FACE_SIZE, FACE_SIZE) {
        return crop.clone();
    }
    imageops::resize(crop, FACE_SIZE, FACE_SIZE, FilterType::Triangle)
}

/// Crop, resize and scale a detected face into the classifier input
pub fn normalize(
    gray: &GrayImage,
    bbox: &BoundingBox,
) -> Result<NormalizedFaceTensor, EmotionDetectionError> {
    let crop = crop_face(gray, bbox)?;
    let face = resize_face(&crop);
    NormalizedFaceTensor::from_face(&face)
}
