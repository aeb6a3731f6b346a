//! Boosted Haar cascade model and window evaluation
//!
//! Reads the OpenCV cascade XML layout (`opencv_storage/cascade`) produced by
//! `opencv_traincascade`, e.g. `haarcascade_frontalface_default.xml`:
//!
//! ```text
//! <cascade>
//!   <stageType>BOOST</stageType> <featureType>HAAR</featureType>
//!   <height>24</height> <width>24</width>
//!   <stages>
//!     <_> <stageThreshold>-5.04</stageThreshold>
//!         <weakClassifiers>
//!           <_> <internalNodes>0 -1 0 -3.15e-02</internalNodes>
//!               <leafValues>2.08 -2.22</leafValues> </_>
//!         </weakClassifiers> </_>
//!   </stages>
//!   <features>
//!     <_> <rects> <_>6 4 12 9 -1.</_> <_>6 7 12 3 3.</_> </rects> </_>
//!   </features>
//! </cascade>
//! ```
//!
//! Only upright features are supported; the frontal-face cascades never use
//! tilted ones.

use crate::integral::IntegralImage;
use crate::FaceDetectionError;
use roxmltree::{Document, Node};
use std::path::Path;
use tracing::{debug, info};

/// Subtracted from every stage threshold when loading, as OpenCV does
const STAGE_THRESHOLD_EPS: f32 = 1e-5;

/// Rectangle component of a Haar feature, in window coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub weight: f32,
}

/// Weighted sum of rectangle sums
#[derive(Debug, Clone, PartialEq)]
pub struct HaarFeature {
    pub rects: Vec<WeightedRect>,
}

/// Internal split node of a weak classifier tree
///
/// Children that are `> 0` index another node of the same tree; children that
/// are `<= 0` address leaf `-child`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeNode {
    pub left: i32,
    pub right: i32,
    pub feature: usize,
    pub threshold: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeakClassifier {
    pub nodes: Vec<TreeNode>,
    pub leaves: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub threshold: f32,
    pub classifiers: Vec<WeakClassifier>,
}

/// A loaded cascade: detection window size, stages and the shared feature pool
#[derive(Debug, Clone, PartialEq)]
pub struct HaarCascade {
    window_width: u32,
    window_height: u32,
    stages: Vec<Stage>,
    features: Vec<HaarFeature>,
}

impl HaarCascade {
    /// Load a cascade from an OpenCV XML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, FaceDetectionError> {
        let path = path.as_ref();
        info!("Loading Haar cascade from {}", path.display());
        let xml = std::fs::read_to_string(path).map_err(|e| {
            FaceDetectionError::ModelLoadError(format!(
                "Failed to read cascade {}: {e}",
                path.display()
            ))
        })?;
        let cascade = Self::from_xml_str(&xml)?;
        info!(
            "Haar cascade loaded ({}x{} window, {} stages, {} features)",
            cascade.window_width,
            cascade.window_height,
            cascade.stages.len(),
            cascade.features.len()
        );
        Ok(cascade)
    }

    /// Parse a cascade from OpenCV XML text
    pub fn from_xml_str(xml: &str) -> Result<Self, FaceDetectionError> {
        let doc = Document::parse(xml)
            .map_err(|e| load_error(format!("Invalid cascade XML: {e}")))?;

        let Some(cascade) = doc.descendants().find(|n| n.has_tag_name("cascade")) else {
            let legacy = doc
                .descendants()
                .any(|n| n.attribute("type_id") == Some("opencv-haar-classifier"));
            return Err(if legacy {
                load_error("Legacy haar classifier format is not supported; re-export with opencv_traincascade")
            } else {
                load_error("No <cascade> element found")
            });
        };

        let stage_type = child_text(cascade, "stageType")?;
        if stage_type != "BOOST" {
            return Err(load_error(format!("Unsupported stage type: {stage_type}")));
        }
        let feature_type = child_text(cascade, "featureType")?;
        if feature_type != "HAAR" {
            return Err(load_error(format!("Unsupported feature type: {feature_type}")));
        }

        let window_width = parse_scalar::<u32>(child_text(cascade, "width")?, "width")?;
        let window_height = parse_scalar::<u32>(child_text(cascade, "height")?, "height")?;
        if window_width < 3 || window_height < 3 {
            return Err(load_error(format!(
                "Window too small: {window_width}x{window_height}"
            )));
        }

        let features = elements(child(cascade, "features")?)
            .enumerate()
            .map(|(idx, node)| parse_feature(node, idx, window_width, window_height))
            .collect::<Result<Vec<_>, _>>()?;

        let stages = elements(child(cascade, "stages")?)
            .enumerate()
            .map(|(idx, node)| parse_stage(node, idx, features.len()))
            .collect::<Result<Vec<_>, _>>()?;

        if stages.is_empty() {
            return Err(load_error("Cascade has no stages"));
        }

        debug!(
            "Parsed cascade: {} stages, {} weak classifiers",
            stages.len(),
            stages.iter().map(|s| s.classifiers.len()).sum::<usize>()
        );

        Ok(Self {
            window_width,
            window_height,
            stages,
            features,
        })
    }

    /// Detection window size `(width, height)` the cascade was trained on
    #[must_use]
    pub fn window_size(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }

    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    #[must_use]
    pub fn features(&self) -> &[HaarFeature] {
        &self.features
    }

    /// Run the cascade on the window whose top-left corner is `(x, y)`
    ///
    /// Returns 1 when every stage accepts, otherwise `-i` for the rejecting
    /// stage `i` (so 0 means rejected by the first stage). The window must lie
    /// inside the integral image.
    #[must_use]
    pub fn evaluate(&self, integral: &IntegralImage, x: u32, y: u32) -> i32 {
        let inv_norm = self.variance_norm_factor(integral, x, y);

        for (stage_idx, stage) in self.stages.iter().enumerate() {
            let mut sum = 0.0f64;
            for classifier in &stage.classifiers {
                let mut idx = 0i32;
                loop {
                    let node = &classifier.nodes[idx as usize];
                    let value = self.feature_value(node.feature, integral, x, y) * inv_norm;
                    idx = if value < f64::from(node.threshold) {
                        node.left
                    } else {
                        node.right
                    };
                    if idx <= 0 {
                        break;
                    }
                }
                sum += f64::from(classifier.leaves[(-idx) as usize]);
            }
            if sum < f64::from(stage.threshold) {
                return -(stage_idx as i32);
            }
        }
        1
    }

    /// Inverse of the window's standard-deviation scale, over the window shrunk
    /// by one pixel on each side
    fn variance_norm_factor(&self, integral: &IntegralImage, x: u32, y: u32) -> f64 {
        let (w, h) = (self.window_width - 2, self.window_height - 2);
        let area = f64::from(w) * f64::from(h);
        let sum = integral.rect_sum(x + 1, y + 1, w, h) as f64;
        let sq_sum = integral.rect_sq_sum(x + 1, y + 1, w, h) as f64;
        let nf = area * sq_sum - sum * sum;
        let nf = if nf > 0.0 { nf.sqrt() } else { 1.0 };
        1.0 / nf
    }

    #[inline]
    fn feature_value(&self, feature: usize, integral: &IntegralImage, x: u32, y: u32) -> f64 {
        self.features[feature]
            .rects
            .iter()
            .map(|r| {
                f64::from(r.weight) * integral.rect_sum(x + r.x, y + r.y, r.width, r.height) as f64
            })
            .sum()
    }
}

fn load_error(msg: impl Into<String>) -> FaceDetectionError {
    FaceDetectionError::ModelLoadError(msg.into())
}

fn elements<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(Node::is_element)
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Result<Node<'a, 'input>, FaceDetectionError> {
    node.children()
        .find(|c| c.has_tag_name(name))
        .ok_or_else(|| load_error(format!("Missing <{name}> in <{}>", node.tag_name().name())))
}

fn child_text<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str, FaceDetectionError> {
    Ok(child(node, name)?.text().unwrap_or_default().trim())
}

fn parse_scalar<T: std::str::FromStr>(text: &str, what: &str) -> Result<T, FaceDetectionError> {
    text.trim()
        .parse::<T>()
        .map_err(|_| load_error(format!("Invalid {what}: {text:?}")))
}

fn parse_numbers(text: &str, what: &str) -> Result<Vec<f64>, FaceDetectionError> {
    text.split_whitespace()
        .map(|tok| parse_scalar::<f64>(tok, what))
        .collect()
}

fn parse_feature(
    node: Node,
    idx: usize,
    window_width: u32,
    window_height: u32,
) -> Result<HaarFeature, FaceDetectionError> {
    if let Ok(tilted) = child_text(node, "tilted") {
        if tilted != "0" {
            return Err(load_error(format!("Feature {idx}: tilted features are not supported")));
        }
    }

    let mut rects = Vec::with_capacity(3);
    for rect_node in elements(child(node, "rects")?) {
        let values = parse_numbers(rect_node.text().unwrap_or_default(), "rect")?;
        let [x, y, w, h, weight] = values[..] else {
            return Err(load_error(format!(
                "Feature {idx}: rect needs 5 values, got {}",
                values.len()
            )));
        };
        if x < 0.0 || y < 0.0 || w < 0.0 || h < 0.0 {
            return Err(load_error(format!("Feature {idx}: negative rect geometry")));
        }
        let rect = WeightedRect {
            x: x as u32,
            y: y as u32,
            width: w as u32,
            height: h as u32,
            weight: weight as f32,
        };
        if rect.x + rect.width > window_width || rect.y + rect.height > window_height {
            return Err(load_error(format!(
                "Feature {idx}: rect {x} {y} {w} {h} exceeds {window_width}x{window_height} window"
            )));
        }
        rects.push(rect);
    }

    if rects.is_empty() {
        return Err(load_error(format!("Feature {idx} has no rects")));
    }
    Ok(HaarFeature { rects })
}

fn parse_stage(node: Node, idx: usize, feature_count: usize) -> Result<Stage, FaceDetectionError> {
    let threshold = parse_scalar::<f32>(child_text(node, "stageThreshold")?, "stageThreshold")?
        - STAGE_THRESHOLD_EPS;

    let classifiers = elements(child(node, "weakClassifiers")?)
        .map(|wc| parse_weak_classifier(wc, idx, feature_count))
        .collect::<Result<Vec<_>, _>>()?;

    if classifiers.is_empty() {
        return Err(load_error(format!("Stage {idx} has no weak classifiers")));
    }
    Ok(Stage {
        threshold,
        classifiers,
    })
}

fn parse_weak_classifier(
    node: Node,
    stage: usize,
    feature_count: usize,
) -> Result<WeakClassifier, FaceDetectionError> {
    let raw_nodes = parse_numbers(child_text(node, "internalNodes")?, "internalNodes")?;
    let leaves: Vec<f32> = parse_numbers(child_text(node, "leafValues")?, "leafValues")?
        .into_iter()
        .map(|v| v as f32)
        .collect();

    if raw_nodes.is_empty() || raw_nodes.len() % 4 != 0 {
        return Err(load_error(format!(
            "Stage {stage}: internalNodes must hold groups of 4 values, got {}",
            raw_nodes.len()
        )));
    }

    let nodes: Vec<TreeNode> = raw_nodes
        .chunks_exact(4)
        .map(|c| TreeNode {
            left: c[0] as i32,
            right: c[1] as i32,
            feature: c[2] as usize,
            threshold: c[3] as f32,
        })
        .collect();

    for node in &nodes {
        if node.feature >= feature_count {
            return Err(load_error(format!(
                "Stage {stage}: feature index {} out of range ({feature_count} features)",
                node.feature
            )));
        }
        for child in [node.left, node.right] {
            let in_range = if child > 0 {
                (child as usize) < nodes.len()
            } else {
                ((-child) as usize) < leaves.len()
            };
            if !in_range {
                return Err(load_error(format!("Stage {stage}: tree child {child} out of range")));
            }
        }
    }

    Ok(WeakClassifier { nodes, leaves })
}
