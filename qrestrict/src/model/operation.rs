use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

use super::OperandId;

/// Stable handle of an operation inside a [`super::Model`].
#[derive(
    Clone, Copy, Debug, Display, From, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display("#{_0}")]
#[serde(transparent)]
pub struct OperationId(pub(crate) usize);

impl OperationId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// The closed set of operation kinds a graph bound for the accelerator may contain.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    #[display("ADD")]
    Add,
    #[display("AVERAGE_POOL_2D")]
    AveragePool2D,
    #[display("BATCH_NORMALIZATION")]
    BatchNormalization,
    #[display("CAST")]
    Cast,
    #[display("CLIP")]
    Clip,
    #[display("CONCAT")]
    Concat,
    #[display("CONV_2D")]
    Conv2D,
    #[display("CONV_2D_TRANSPOSE")]
    Conv2DTranspose,
    #[display("DIV")]
    Div,
    #[display("EXP")]
    Exp,
    #[display("FLATTEN")]
    Flatten,
    #[display("FULLY_CONNECTED")]
    FullyConnected,
    #[display("GATHER")]
    Gather,
    #[display("HARD_SIGMOID")]
    HardSigmoid,
    #[display("HARD_SWISH")]
    HardSwish,
    #[display("LAYER_NORMALIZATION")]
    LayerNormalization,
    #[display("LEAKY_RELU")]
    LeakyRelu,
    #[display("LOG")]
    Log,
    #[display("MAT_MUL")]
    MatMul,
    #[display("MAX_POOL_2D")]
    MaxPool2D,
    #[display("MUL")]
    Mul,
    #[display("PAD")]
    Pad,
    #[display("POW")]
    Pow,
    #[display("REDUCE_MEAN")]
    ReduceMean,
    #[display("RELU")]
    Relu,
    #[display("RELU6")]
    Relu6,
    /// Conversion between two quantizations of the same real values, inserted by the
    /// restriction pass.
    #[display("REQUANT")]
    Requant,
    #[display("RESHAPE")]
    Reshape,
    #[display("RESIZE_NEAREST")]
    ResizeNearest,
    #[display("SIGMOID")]
    Sigmoid,
    #[display("SLICE")]
    Slice,
    #[display("SOFTMAX")]
    Softmax,
    #[display("SPLIT")]
    Split,
    #[display("SQUEEZE")]
    Squeeze,
    #[display("STACK")]
    Stack,
    #[display("SUB")]
    Sub,
    #[display("TANH")]
    Tanh,
    #[display("TILE")]
    Tile,
    #[display("TRANSPOSE")]
    Transpose,
    #[display("UNSQUEEZE")]
    Unsqueeze,
}

/// Represents an operation in a model with its ordered input and output operands.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub(crate) kind: OperationKind,
    pub(crate) inputs: Vec<OperandId>,
    pub(crate) outputs: Vec<OperandId>,
}

impl Operation {
    pub fn new(kind: OperationKind, inputs: Vec<OperandId>, outputs: Vec<OperandId>) -> Self {
        Self {
            kind,
            inputs,
            outputs,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn inputs(&self) -> &[OperandId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OperandId] {
        &self.outputs
    }
}
