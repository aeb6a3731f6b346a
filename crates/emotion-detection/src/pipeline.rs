//! Image bytes to emotion label
//!
//! decode -> grayscale -> locate faces -> first face -> normalize -> classify

use crate::preprocess::normalize;
use crate::{Classifier, EmotionDetectionError, EmotionDistribution, PredictionResult};
use image::{GrayImage, RgbImage};
use mood_tracker_common::image_io::{decode_rgb, rgb_to_gray};
use mood_tracker_common::ProcessingError;
use mood_tracker_face_detection::{BoundingBox, FaceDetectionError, FaceLocator};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] ProcessingError),

    #[error("Face detection failed: {0}")]
    Detection(#[from] FaceDetectionError),

    #[error("Classification failed: {0}")]
    Classification(#[from] EmotionDetectionError),
}

impl PipelineError {
    /// True when the request itself was bad (undecodable upload)
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::Decode(_))
    }
}

/// Prediction plus the intermediate values behind it
#[derive(Debug, Clone, Serialize)]
pub struct DetailedPrediction {
    pub result: PredictionResult,
    /// Face the result was computed from, `None` when no face was found
    pub face: Option<BoundingBox>,
    pub distribution: Option<EmotionDistribution>,
    /// Number of faces the locator returned
    pub faces_found: usize,
}

/// Face locator and classifier, both loaded once and shared read-only
#[derive(Clone)]
pub struct EmotionPipeline {
    locator: Arc<dyn FaceLocator>,
    classifier: Arc<dyn Classifier>,
}

impl std::fmt::Debug for EmotionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmotionPipeline").finish_non_exhaustive()
    }
}

impl EmotionPipeline {
    pub fn new(locator: Arc<dyn FaceLocator>, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            locator,
            classifier,
        }
    }

    #[must_use]
    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }

    /// Decode an uploaded image and predict the emotion of its first face
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<PredictionResult, PipelineError> {
        let image = decode_rgb(bytes)?;
        self.predict_image(&image)
    }

    pub fn predict_image(&self, image: &RgbImage) -> Result<PredictionResult, PipelineError> {
        Ok(self.predict_detailed(image)?.result)
    }

    pub fn predict_gray(&self, gray: &GrayImage) -> Result<PredictionResult, PipelineError> {
        Ok(self.predict_gray_detailed(gray)?.result)
    }

    pub fn predict_detailed(&self, image: &RgbImage) -> Result<DetailedPrediction, PipelineError> {
        let gray = rgb_to_gray(image);
        self.predict_gray_detailed(&gray)
    }

    fn predict_gray_detailed(&self, gray: &GrayImage) -> Result<DetailedPrediction, PipelineError> {
        let faces = self.locator.locate(gray)?;
        debug!("Located {} faces in {}x{} image", faces.len(), gray.width(), gray.height());

        let Some(&face) = faces.first() else {
            info!("No face found");
            return Ok(DetailedPrediction {
                result: PredictionResult::no_face(),
                face: None,
                distribution: None,
                faces_found: 0,
            });
        };

        let tensor = normalize(gray, &face)?;
        let distribution = self.classifier.classify(&tensor)?;
        let result = PredictionResult::from_distribution(&distribution);
        info!(
            "Predicted {} ({:.2}%) with {} classifier",
            result.emotion,
            result.confidence,
            self.classifier.name()
        );

        Ok(DetailedPrediction {
            result,
            face: Some(face),
            distribution: Some(distribution),
            faces_found: faces.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::tests::seeded_network;
    use crate::NormalizedFaceTensor;
    use image::{ImageFormat, Luma, Rgb};
    use std::io::Cursor;
    use std::sync::Mutex;

    struct FixedLocator(Vec<BoundingBox>);

    impl FaceLocator for FixedLocator {
        fn locate(&self, _image: &GrayImage) -> Result<Vec<BoundingBox>, FaceDetectionError> {
            Ok(self.0.clone())
        }
    }

    /// Records the tensors it sees and returns a fixed distribution
    struct RecordingClassifier {
        output: EmotionDistribution,
        seen: Mutex<Vec<NormalizedFaceTensor>>,
    }

    impl RecordingClassifier {
        fn new(output: [f32; 7]) -> Self {
            Self {
                output: EmotionDistribution::new(output),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Classifier for RecordingClassifier {
        fn classify(
            &self,
            input: &NormalizedFaceTensor,
        ) -> Result<EmotionDistribution, EmotionDetectionError> {
            self.seen.lock().unwrap().push(input.clone());
            Ok(self.output)
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    struct FailingClassifier;

    impl Classifier for FailingClassifier {
        fn classify(
            &self,
            _input: &NormalizedFaceTensor,
        ) -> Result<EmotionDistribution, EmotionDetectionError> {
            Err(EmotionDetectionError::InferenceError("boom".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn png_bytes(image: &RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    const HAPPY: [f32; 7] = [0.01, 0.01, 0.02, 0.9, 0.02, 0.02, 0.02];

    #[test]
    fn test_no_face_returns_sentinel() {
        let classifier = Arc::new(RecordingClassifier::new(HAPPY));
        let pipeline = EmotionPipeline::new(Arc::new(FixedLocator(vec![])), classifier.clone());
        let result = pipeline
            .predict_image(&RgbImage::from_pixel(64, 64, Rgb([255, 255, 255])))
            .unwrap();
        assert_eq!(result, PredictionResult::no_face());
        assert!(classifier.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_first_face_is_classified() {
        let classifier = Arc::new(RecordingClassifier::new(HAPPY));
        let faces = vec![BoundingBox::new(0, 0, 48, 48), BoundingBox::new(48, 0, 48, 48)];
        let pipeline = EmotionPipeline::new(Arc::new(FixedLocator(faces)), classifier.clone());

        // Left half black, right half white
        let image = RgbImage::from_fn(96, 48, |x, _| {
            if x < 48 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let detailed = pipeline.predict_detailed(&image).unwrap();

        assert_eq!(detailed.result.emotion, "Happy");
        assert!((detailed.result.confidence - 90.0).abs() < 1e-6);
        assert_eq!(detailed.face, Some(BoundingBox::new(0, 0, 48, 48)));
        assert_eq!(detailed.faces_found, 2);

        let seen = classifier.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].as_array().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_predict_bytes_decodes_png() {
        let classifier = Arc::new(RecordingClassifier::new(HAPPY));
        let pipeline = EmotionPipeline::new(
            Arc::new(FixedLocator(vec![BoundingBox::new(8, 8, 32, 32)])),
            classifier,
        );
        let bytes = png_bytes(&RgbImage::from_pixel(64, 64, Rgb([120, 120, 120])));
        let result = pipeline.predict_bytes(&bytes).unwrap();
        assert_eq!(result.emotion, "Happy");
        assert!((0.0..=100.0).contains(&result.confidence));
    }

    #[test]
    fn test_undecodable_bytes_are_client_error() {
        let pipeline = EmotionPipeline::new(
            Arc::new(FixedLocator(vec![])),
            Arc::new(RecordingClassifier::new(HAPPY)),
        );
        let err = pipeline.predict_bytes(b"definitely not an image").unwrap_err();
        assert!(err.is_client_error());
        assert!(matches!(err, PipelineError::Decode(_)));
    }

    #[test]
    fn test_classifier_failure_is_server_error() {
        let pipeline = EmotionPipeline::new(
            Arc::new(FixedLocator(vec![BoundingBox::new(0, 0, 10, 10)])),
            Arc::new(FailingClassifier),
        );
        let err = pipeline.predict_gray(&GrayImage::new(20, 20)).unwrap_err();
        assert!(!err.is_client_error());
        assert!(matches!(err, PipelineError::Classification(_)));
    }

    #[test]
    fn test_native_network_through_pipeline() {
        let pipeline = EmotionPipeline::new(
            Arc::new(FixedLocator(vec![BoundingBox::new(10, 10, 60, 60)])),
            Arc::new(seeded_network(21)),
        );
        let gray = GrayImage::from_fn(80, 80, |x, y| Luma([((x * 3 + y) % 256) as u8]));
        let detailed = pipeline.predict_gray_detailed(&gray).unwrap();
        let dist = detailed.distribution.unwrap();
        assert!((dist.sum() - 1.0).abs() < 1e-5);
        assert!((0.0..=100.0).contains(&detailed.result.confidence));
        assert_eq!(pipeline.classifier_name(), "native");
    }
}
