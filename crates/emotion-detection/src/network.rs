//! Emotion CNN evaluated with candle
//!
//! Topology (inference mode):
//!
//! ```text
//! input 48x48x1
//!   4 x [Conv3x3 same, no bias -> BatchNorm -> ReLU -> MaxPool 2x2 -> Dropout]
//!       widths 8, 16, 32, 64
//!   Conv3x3 same, bias -> 7
//!   GlobalAveragePooling -> softmax
//! ```
//!
//! Dropout is the identity at inference and has no weights. Batch norm uses
//! the running statistics. Weights use candle's conv layout `(out, in, kh, kw)`
//! and these tensor names:
//!
//! - `block{1..4}.conv.weight`
//! - `block{1..4}.bn.{weight,bias,running_mean,running_var}`
//! - `head.weight`, `head.bias`

use crate::{Classifier, EmotionDetectionError, EmotionDistribution, NormalizedFaceTensor, NUM_CLASSES};
use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, VarBuilder};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Output channels of the four convolution blocks
pub const BLOCK_WIDTHS: [usize; 4] = [8, 16, 32, 64];

/// Keras `BatchNormalization` default epsilon
pub const BN_EPSILON: f64 = 1e-3;

pub const KERNEL_SIZE: usize = 3;

fn same_padding() -> Conv2dConfig {
    Conv2dConfig {
        padding: KERNEL_SIZE / 2,
        ..Default::default()
    }
}

/// Conv -> BatchNorm -> ReLU -> MaxPool 2x2
#[derive(Debug, Clone)]
struct ConvBlock {
    conv: Conv2d,
    bn: BatchNorm,
}

impl ConvBlock {
    fn load(in_channels: usize, out_channels: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        let conv = candle_nn::conv2d_no_bias(
            in_channels,
            out_channels,
            KERNEL_SIZE,
            same_padding(),
            vb.pp("conv"),
        )?;
        let bn = candle_nn::batch_norm(
            out_channels,
            BatchNormConfig {
                eps: BN_EPSILON,
                ..Default::default()
            },
            vb.pp("bn"),
        )?;
        Ok(Self { conv, bn })
    }

    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        x.apply(&self.conv)?
            .apply_t(&self.bn, false)?
            .relu()?
            .max_pool2d(2)
    }
}

/// Native emotion CNN
#[derive(Debug, Clone)]
pub struct NativeCnn {
    blocks: Vec<ConvBlock>,
    head: Conv2d,
    device: Device,
}

impl NativeCnn {
    /// Build the network from a variable store
    pub fn load(vb: VarBuilder) -> Result<Self, EmotionDetectionError> {
        let device = vb.device().clone();
        Self::build(vb, device).map_err(|e| EmotionDetectionError::ModelLoadError(format!("{e:#}")))
    }

    fn build(vb: VarBuilder, device: Device) -> Result<Self> {
        let mut blocks = Vec::with_capacity(BLOCK_WIDTHS.len());
        let mut cin = 1;
        for (i, &cout) in BLOCK_WIDTHS.iter().enumerate() {
            let block = ConvBlock::load(cin, cout, vb.pp(format!("block{}", i + 1)))
                .with_context(|| format!("Failed to load block {}", i + 1))?;
            blocks.push(block);
            cin = cout;
        }
        let head = candle_nn::conv2d(cin, NUM_CLASSES, KERNEL_SIZE, same_padding(), vb.pp("head"))
            .context("Failed to load classifier head")?;
        Ok(Self {
            blocks,
            head,
            device,
        })
    }

    pub fn from_safetensors_file<P: AsRef<Path>>(path: P) -> Result<Self, EmotionDetectionError> {
        let path = path.as_ref();
        info!("Loading native CNN weights from {}", path.display());
        if !path.exists() {
            return Err(EmotionDetectionError::ModelLoadError(format!(
                "Weights file not found: {}",
                path.display()
            )));
        }
        // SAFETY: the file is only read and is not expected to change while mapped
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, &Device::Cpu) }
            .map_err(|e| {
                EmotionDetectionError::ModelLoadError(format!("{}: {e}", path.display()))
            })?;
        Self::load(vb)
    }

    pub fn from_safetensors_bytes(bytes: Vec<u8>) -> Result<Self, EmotionDetectionError> {
        let vb = VarBuilder::from_buffered_safetensors(bytes, DType::F32, &Device::Cpu)
            .map_err(|e| EmotionDetectionError::ModelLoadError(format!("Invalid safetensors: {e}")))?;
        Self::load(vb)
    }

    /// Build from named in-memory tensors
    pub fn from_tensors(tensors: HashMap<String, Tensor>) -> Result<Self, EmotionDetectionError> {
        debug!("Building native CNN from {} tensors", tensors.len());
        Self::load(VarBuilder::from_tensors(tensors, DType::F32, &Device::Cpu))
    }

    /// Raw class scores before softmax
    pub fn logits(&self, input: &NormalizedFaceTensor) -> Result<[f32; NUM_CLASSES], EmotionDetectionError> {
        self.forward(input)
            .map_err(|e| EmotionDetectionError::InferenceError(format!("{e:#}")))
    }

    fn forward(&self, input: &NormalizedFaceTensor) -> Result<[f32; NUM_CLASSES]> {
        let array = input.as_array();
        let (n, h, w, c) = array.dim();
        let data: Vec<f32> = array.iter().copied().collect();

        // NHWC -> NCHW
        let mut x = Tensor::from_vec(data, (n, h, w, c), &self.device)?
            .permute((0, 3, 1, 2))?
            .contiguous()?;
        for (i, block) in self.blocks.iter().enumerate() {
            x = block
                .forward(&x)
                .with_context(|| format!("Block {} failed", i + 1))?;
        }
        let scores = x
            .apply(&self.head)?
            .mean((2, 3))?
            .squeeze(0)?
            .to_vec1::<f32>()?;

        scores.as_slice().try_into().map_err(|_| {
            anyhow::Error::new(EmotionDetectionError::InvalidOutput {
                expected: NUM_CLASSES,
                actual: scores.len(),
            })
        })
    }
}

impl Classifier for NativeCnn {
    fn classify(
        &self,
        input: &NormalizedFaceTensor,
    ) -> Result<EmotionDistribution, EmotionDetectionError> {
        let logits = self.logits(input)?;
        debug!("Native CNN logits: {:?}", logits);
        Ok(EmotionDistribution::from_logits(&logits))
    }

    fn name(&self) -> &str {
        "native"
    }
}
