//! Face detection with a boosted Haar cascade
//!
//! This crate locates frontal faces in grayscale images using the Viola-Jones
//! sliding-window cascade, reading the pretrained models distributed with
//! OpenCV (e.g. `haarcascade_frontalface_default.xml`).
//!
//! # Features
//! - Pure Rust cascade evaluation over integral images
//! - Multi-scale scan with configurable scale factor and size limits
//! - Neighbour grouping of raw hits (`min_neighbors`)
//! - [`FaceLocator`] trait so callers can substitute deterministic stubs
//!
//! # Example
//! ```no_run
//! use mood_tracker_face_detection::{CascadeConfig, FaceLocator, HaarFaceDetector};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let detector = HaarFaceDetector::new(
//!     "models/haarcascade_frontalface_default.xml",
//!     CascadeConfig::default(),
//! )?;
//!
//! let gray = image::open("face.jpg")?.to_luma8();
//! for face in detector.locate(&gray)? {
//!     println!("Face at ({}, {}) size {}x{}", face.x, face.y, face.width, face.height);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cascade;
pub mod grouping;
pub mod integral;

use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

pub use cascade::HaarCascade;
pub use integral::IntegralImage;

/// Pyramid step between detection scales
pub const DEFAULT_SCALE_FACTOR: f64 = 1.3;

/// Raw hits a detection needs (exclusive) to survive grouping
pub const DEFAULT_MIN_NEIGHBORS: usize = 5;

/// Face bounding box in pixel coordinates of the searched image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    #[must_use]
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge
    #[must_use]
    #[inline]
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    /// Exclusive bottom edge
    #[must_use]
    #[inline]
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    #[must_use]
    #[inline]
    pub fn area(&self) -> i64 {
        i64::from(self.width) * i64::from(self.height)
    }

    /// Intersection with the `width` x `height` image rectangle, if non-empty
    #[must_use]
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<BoundingBox> {
        let x1 = self.x.max(0);
        let y1 = self.y.max(0);
        let x2 = self.right().min(width as i32);
        let y2 = self.bottom().min(height as i32);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(BoundingBox::new(x1, y1, x2 - x1, y2 - y1))
    }
}

/// Errors that can occur during face detection
#[derive(Error, Debug)]
pub enum FaceDetectionError {
    #[error("Failed to load cascade: {0}")]
    ModelLoadError(String),

    #[error("Invalid detector configuration: {0}")]
    InvalidConfig(String),
}

/// Configuration for the multi-scale cascade scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// Image pyramid step; must be greater than 1.0
    pub scale_factor: f64,
    /// A grouped detection needs more than this many raw hits
    pub min_neighbors: usize,
    /// Smallest face `(width, height)` to report; defaults to the cascade window
    pub min_size: Option<(u32, u32)>,
    /// Largest face `(width, height)` to report; defaults to the image size
    pub max_size: Option<(u32, u32)>,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
            min_size: None,
            max_size: None,
        }
    }
}

impl CascadeConfig {
    pub fn validate(&self) -> Result<(), FaceDetectionError> {
        if !(self.scale_factor > 1.0) || !self.scale_factor.is_finite() {
            return Err(FaceDetectionError::InvalidConfig(format!(
                "scale_factor must be > 1.0, got {}",
                self.scale_factor
            )));
        }
        if let (Some(min), Some(max)) = (self.min_size, self.max_size) {
            if min.0 > max.0 || min.1 > max.1 {
                return Err(FaceDetectionError::InvalidConfig(format!(
                    "min_size {min:?} exceeds max_size {max:?}"
                )));
            }
        }
        Ok(())
    }
}

/// Locates faces in a grayscale image
///
/// The returned order is whatever the implementation yields; callers that take
/// a single face take the first entry. An empty vector means no face was found.
pub trait FaceLocator: Send + Sync {
    fn locate(&self, image: &GrayImage) -> Result<Vec<BoundingBox>, FaceDetectionError>;
}

/// Sliding-window Haar cascade face detector
#[derive(Debug, Clone)]
pub struct HaarFaceDetector {
    cascade: HaarCascade,
    config: CascadeConfig,
}

impl HaarFaceDetector {
    /// Load a cascade XML file and build a detector
    pub fn new<P: AsRef<Path>>(
        cascade_path: P,
        config: CascadeConfig,
    ) -> Result<Self, FaceDetectionError> {
        let cascade = HaarCascade::from_file(cascade_path)?;
        Self::from_cascade(cascade, config)
    }

    /// Build a detector from an already parsed cascade
    pub fn from_cascade(
        cascade: HaarCascade,
        config: CascadeConfig,
    ) -> Result<Self, FaceDetectionError> {
        config.validate()?;
        Ok(Self { cascade, config })
    }

    #[must_use]
    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    #[must_use]
    pub fn cascade(&self) -> &HaarCascade {
        &self.cascade
    }

    /// Every window accepted by the cascade, across all scales, before grouping
    #[must_use]
    pub fn detect_raw(&self, image: &GrayImage) -> Vec<BoundingBox> {
        let (img_w, img_h) = image.dimensions();
        let (win_w, win_h) = self.cascade.window_size();
        let min_size = self.config.min_size.unwrap_or((win_w, win_h));
        let max_size = self.config.max_size.unwrap_or((img_w, img_h));

        let mut hits = Vec::new();
        let mut factor = 1.0f64;
        loop {
            let window_w = (f64::from(win_w) * factor).round() as u32;
            let window_h = (f64::from(win_h) * factor).round() as u32;
            let scaled_w = (f64::from(img_w) / factor).round() as u32;
            let scaled_h = (f64::from(img_h) / factor).round() as u32;

            if scaled_w <= win_w || scaled_h <= win_h {
                break;
            }
            if window_w > max_size.0 || window_h > max_size.1 {
                break;
            }
            if window_w < min_size.0 || window_h < min_size.1 {
                factor *= self.config.scale_factor;
                continue;
            }

            let integral = if factor == 1.0 {
                IntegralImage::new(image)
            } else {
                let scaled = image::imageops::resize(
                    image,
                    scaled_w,
                    scaled_h,
                    image::imageops::FilterType::Triangle,
                );
                IntegralImage::new(&scaled)
            };

            let before = hits.len();
            let step = if factor > 2.0 { 1 } else { 2 };
            for y in (0..scaled_h - win_h).step_by(step) {
                let mut x = 0;
                while x < scaled_w - win_w {
                    let result = self.cascade.evaluate(&integral, x, y);
                    if result > 0 {
                        hits.push(BoundingBox::new(
                            (f64::from(x) * factor).round() as i32,
                            (f64::from(y) * factor).round() as i32,
                            window_w as i32,
                            window_h as i32,
                        ));
                    }
                    if result == 0 {
                        x += step as u32;
                    }
                    x += step as u32;
                }
            }

            debug!(
                "Scale {:.3}: {}x{} image, {}x{} window, {} hits",
                factor,
                scaled_w,
                scaled_h,
                window_w,
                window_h,
                hits.len() - before
            );
            factor *= self.config.scale_factor;
        }
        hits
    }

    /// Multi-scale detection followed by neighbour grouping
    #[must_use]
    pub fn detect_multi_scale(&self, image: &GrayImage) -> Vec<BoundingBox> {
        let raw = self.detect_raw(image);
        let faces = grouping::group_rectangles(&raw, self.config.min_neighbors, grouping::GROUP_EPS);
        debug!(
            "Grouped {} raw hits into {} faces (min_neighbors: {})",
            raw.len(),
            faces.len(),
            self.config.min_neighbors
        );
        faces
    }
}

impl FaceLocator for HaarFaceDetector {
    fn locate(&self, image: &GrayImage) -> Result<Vec<BoundingBox>, FaceDetectionError> {
        Ok(self.detect_multi_scale(image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::tests::{EDGE_CASCADE, TWO_STAGE_CASCADE};
    use image::Luma;

    fn edge_detector(config: CascadeConfig) -> HaarFaceDetector {
        let cascade = HaarCascade::from_xml_str(EDGE_CASCADE).unwrap();
        HaarFaceDetector::from_cascade(cascade, config).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = CascadeConfig::default();
        assert_eq!(config.scale_factor, 1.3);
        assert_eq!(config.min_neighbors, 5);
        assert_eq!(config.min_size, None);
        assert_eq!(config.max_size, None);
    }

    #[test]
    fn test_config_rejects_non_growing_scale() {
        let config = CascadeConfig {
            scale_factor: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let cascade = HaarCascade::from_xml_str(EDGE_CASCADE).unwrap();
        assert!(HaarFaceDetector::from_cascade(cascade, config).is_err());
    }

    #[test]
    fn test_config_rejects_inverted_sizes() {
        let config = CascadeConfig {
            min_size: Some((100, 100)),
            max_size: Some((50, 50)),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bounding_box_clamp() {
        let bbox = BoundingBox::new(-5, 10, 20, 100);
        assert_eq!(bbox.clamp_to(50, 50), Some(BoundingBox::new(0, 10, 15, 40)));
        assert_eq!(BoundingBox::new(60, 0, 10, 10).clamp_to(50, 50), None);
        assert_eq!(bbox.area(), 2000);
        assert_eq!((bbox.right(), bbox.bottom()), (15, 110));
    }

    #[test]
    fn test_blank_image_has_no_faces() {
        let detector = edge_detector(CascadeConfig::default());
        let white = GrayImage::from_pixel(120, 90, Luma([255]));
        assert!(detector.detect_raw(&white).is_empty());
        assert!(detector.locate(&white).unwrap().is_empty());
    }

    #[test]
    fn test_image_smaller_than_window() {
        let detector = edge_detector(CascadeConfig::default());
        let tiny = GrayImage::from_pixel(20, 20, Luma([0]));
        assert!(detector.locate(&tiny).unwrap().is_empty());
    }

    #[test]
    fn test_vertical_edge_detected_and_grouped() {
        let detector = edge_detector(CascadeConfig::default());
        let img = GrayImage::from_fn(100, 100, |x, _| Luma([if x < 50 { 255 } else { 0 }]));

        let raw = detector.detect_raw(&img);
        assert!(raw.len() > 5);
        for hit in &raw {
            assert!(hit.x < 50 && hit.right() > 50, "hit {hit:?} must straddle the edge");
        }

        let faces = detector.locate(&img).unwrap();
        assert!(!faces.is_empty());
        assert!(faces.len() < raw.len());
        for face in &faces {
            assert!(face.x >= 0 && face.y >= 0);
            assert!(face.right() <= 100 && face.bottom() <= 100);
        }
    }

    #[test]
    fn test_windows_failing_later_stage_not_reported() {
        let cascade = HaarCascade::from_xml_str(TWO_STAGE_CASCADE).unwrap();
        let config = CascadeConfig {
            min_neighbors: 0,
            ..Default::default()
        };
        let detector = HaarFaceDetector::from_cascade(cascade, config).unwrap();

        // Every straddling window passes the edge stage and fails the next one
        let edge = GrayImage::from_fn(100, 100, |x, _| Luma([if x < 50 { 255 } else { 0 }]));
        assert!(detector.detect_raw(&edge).is_empty());

        let corner = GrayImage::from_fn(100, 100, |x, y| Luma([if x < 50 || y < 50 { 255 } else { 0 }]));
        let raw = detector.detect_raw(&corner);
        assert!(!raw.is_empty());
        for hit in &raw {
            assert!(hit.x < 50 && hit.right() > 50, "hit {hit:?} must straddle x = 50");
            assert!(hit.y < 50 && hit.bottom() > 50, "hit {hit:?} must straddle y = 50");
        }
    }

    #[test]
    fn test_zero_neighbors_returns_raw_hits() {
        let config = CascadeConfig {
            min_neighbors: 0,
            ..Default::default()
        };
        let detector = edge_detector(config);
        let img = GrayImage::from_fn(60, 60, |x, _| Luma([if x < 30 { 255 } else { 0 }]));
        assert_eq!(detector.locate(&img).unwrap(), detector.detect_raw(&img));
    }

    #[test]
    fn test_min_size_skips_small_scales() {
        let config = CascadeConfig {
            min_size: Some((40, 40)),
            min_neighbors: 0,
            ..Default::default()
        };
        let detector = edge_detector(config);
        let img = GrayImage::from_fn(100, 100, |x, _| Luma([if x < 50 { 255 } else { 0 }]));
        let raw = detector.detect_raw(&img);
        assert!(!raw.is_empty());
        assert!(raw.iter().all(|b| b.width >= 40 && b.height >= 40));
    }

    #[test]
    fn test_max_size_limits_scales() {
        let config = CascadeConfig {
            max_size: Some((24, 24)),
            min_neighbors: 0,
            ..Default::default()
        };
        let detector = edge_detector(config);
        let img = GrayImage::from_fn(100, 100, |x, _| Luma([if x < 50 { 255 } else { 0 }]));
        let raw = detector.detect_raw(&img);
        assert!(!raw.is_empty());
        assert!(raw.iter().all(|b| b.width == 24 && b.height == 24));
    }
}
