use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

use crate::quantization::QuantParams;

/// Stable handle of an operand inside a [`super::Model`]. Handles are never reused, the
/// model only ever appends operands.
#[derive(
    Clone, Copy, Debug, Display, From, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display("%{_0}")]
#[serde(transparent)]
pub struct OperandId(pub(crate) usize);

impl OperandId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Constant data attached to an operand (weights, bias).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "data", rename_all = "snake_case")]
pub enum ConstantBuffer {
    Int8(Vec<i8>),
    UInt8(Vec<u8>),
    Int32(Vec<i32>),
    Float32(Vec<f32>),
}

impl ConstantBuffer {
    pub fn dtype(&self) -> &'static str {
        match self {
            ConstantBuffer::Int8(_) => "int8",
            ConstantBuffer::UInt8(_) => "uint8",
            ConstantBuffer::Int32(_) => "int32",
            ConstantBuffer::Float32(_) => "float32",
        }
    }
}

/// A tensor flowing through the model: its quantization, its shape and, for constants,
/// its data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Operand {
    pub(crate) quant: QuantParams,
    pub(crate) shape: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) buffer: Option<ConstantBuffer>,
}

impl Operand {
    pub fn new(quant: QuantParams, shape: Vec<usize>) -> Self {
        Self {
            quant,
            shape,
            buffer: None,
        }
    }

    pub fn with_buffer(self, buffer: ConstantBuffer) -> Self {
        Self {
            buffer: Some(buffer),
            ..self
        }
    }

    pub fn quant(&self) -> &QuantParams {
        &self.quant
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn buffer(&self) -> Option<&ConstantBuffer> {
        self.buffer.as_ref()
    }

    /// Copy of this operand with a different quantization and no constant data, used as the
    /// fresh end of a requant edge.
    pub(crate) fn requantized(&self, quant: QuantParams) -> Self {
        Self::new(quant, self.shape.clone())
    }
}
