//! Module that takes care of the per-layer quantization parameters attached to operands,
//! and of the numeric kernels used to move constant buffers from one scale to another.
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::warn;

/// Quantization parameters of an operand. Only per-layer (i.e. per-tensor) schemes are
/// represented, a single scale covers the whole tensor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuantParams {
    /// The operand is not quantized (float tensors, shape operands, ...)
    #[default]
    None,
    /// Affine quantization: `q = round(r / scale) + zero_point`
    AsymmPerLayer { scale: f32, zero_point: i32 },
    /// Symmetric quantization, the zero point is always 0. Used for the bias of accumulators.
    SymmPerLayer { scale: f32 },
}

impl QuantParams {
    pub fn asymm(scale: f32, zero_point: i32) -> Self {
        Self::AsymmPerLayer { scale, zero_point }
    }

    pub fn symm(scale: f32) -> Self {
        Self::SymmPerLayer { scale }
    }

    pub fn is_asymm_per_layer(&self) -> bool {
        matches!(self, Self::AsymmPerLayer { .. })
    }

    pub fn is_symm_per_layer(&self) -> bool {
        matches!(self, Self::SymmPerLayer { .. })
    }

    /// Returns the scale, or `None` if the operand is not quantized.
    pub fn scale(&self) -> Option<f32> {
        match self {
            Self::None => None,
            Self::AsymmPerLayer { scale, .. } | Self::SymmPerLayer { scale } => Some(*scale),
        }
    }

    /// Zero point of the quantized domain; 0 for symmetric and non quantized operands.
    pub fn zero_point(&self) -> i32 {
        match self {
            Self::AsymmPerLayer { zero_point, .. } => *zero_point,
            Self::None | Self::SymmPerLayer { .. } => 0,
        }
    }
}

impl Display for QuantParams {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::None => write!(f, "none"),
            Self::AsymmPerLayer { scale, zero_point } => {
                write!(f, "asymm(scale: {scale}, zero_point: {zero_point})")
            }
            Self::SymmPerLayer { scale } => write!(f, "symm(scale: {scale})"),
        }
    }
}

/// Maps quantized integers back to real values: `r = (q - zero_point) * scale`
pub fn dequantize(values: &[i32], scale: f32, zero_point: i32) -> Vec<f32> {
    values
        .iter()
        .map(|q| (*q as i64 - zero_point as i64) as f32 * scale)
        .collect()
}

/// Take real values and quantize them into the 32-bit integer domain.
/// formula is q = round(r/S) + z, clamped to the range of `i32`
pub fn quantize(values: &[f32], scale: f32, zero_point: i32) -> Vec<i32> {
    let (min, max) = (i32::MIN as f64, i32::MAX as f64);
    values
        .iter()
        .map(|value| {
            let scaled = (*value / scale).round() as f64 + zero_point as f64;
            if scaled < min || scaled > max {
                warn!(
                    "Quantized value {} from {} is out of range [{}, {}]",
                    scaled, value, min, max
                );
            }
            scaled.clamp(min, max) as i32
        })
        .collect()
}
