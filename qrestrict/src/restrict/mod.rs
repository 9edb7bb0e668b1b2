//! Restriction of the quantization parameters of a model before it is lowered onto a
//! fixed-point accelerator.
//!
//! The accelerator needs bit-exact equal (scale, zero point) on both sides of data movement
//! operations (reshape, concat, split, ...) and a bias quantized at the accumulator scale for
//! convolutions and fully connected layers. [`RestrictPass`] walks the model once, in
//! topological order, and for each operation applies the [`Policy`] of its kind: either the
//! bias is rescaled in place or requant operations are spliced in on the mismatching edges.
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::{Model, Operation, OperationId, OperationKind};

pub mod align;
pub mod bias;
mod error;

pub use align::{EdgeSide, align_scale, align_scale_to_operand};
pub use bias::rescale_bias_and_output;
pub use error::RestrictError;

pub const DEFAULT_SCALE_TOLERANCE: f64 = 1e-5;
pub const DEFAULT_BIAS_SCALE_TOLERANCE: f64 = 1e-6;
pub const DEFAULT_OUTPUT_SCALE_MARGIN: f64 = 1e-6;

/// Numeric thresholds of the pass.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RestrictConfig {
    /// Two scales closer than this are considered equal when aligning operands.
    pub scale_tolerance: f64,
    /// Maximum distance between the bias scale and `input_scale * weight_scale`.
    pub bias_scale_tolerance: f64,
    /// Added to `input_scale * weight_scale` when the output scale has to be raised above it.
    pub output_scale_margin: f64,
}

impl Default for RestrictConfig {
    fn default() -> Self {
        Self {
            scale_tolerance: DEFAULT_SCALE_TOLERANCE,
            bias_scale_tolerance: DEFAULT_BIAS_SCALE_TOLERANCE,
            output_scale_margin: DEFAULT_OUTPUT_SCALE_MARGIN,
        }
    }
}

/// What the pass does with an operation, decided by its kind only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Policy {
    /// inputs are (input, weight, bias), the bias is moved to the accumulator scale and the
    /// output scale is kept above it
    Accumulator,
    /// every input but the last one is aligned to the output
    Merge,
    /// the first input is aligned to the first output
    Passthrough,
    /// every output is aligned to the first input
    FanOut,
    /// scales are free on both sides
    Unconstrained,
    /// the accelerator path has no handling for this kind
    Unsupported,
}

impl Policy {
    /// The match is exhaustive on purpose: a new [`OperationKind`] does not compile until it
    /// is given a policy.
    pub fn for_kind(kind: OperationKind) -> Self {
        use OperationKind as K;
        match kind {
            K::Conv2D | K::FullyConnected => Policy::Accumulator,
            K::Concat => Policy::Merge,
            K::Flatten | K::Relu | K::Reshape | K::Transpose | K::Unsqueeze => {
                Policy::Passthrough
            }
            K::Split => Policy::FanOut,
            K::Add
            | K::AveragePool2D
            | K::Conv2DTranspose
            | K::Div
            | K::MatMul
            | K::HardSigmoid
            | K::HardSwish
            | K::MaxPool2D
            | K::Mul
            | K::Relu6
            | K::Requant
            | K::Sigmoid
            | K::Softmax
            | K::Sub
            | K::Tanh => Policy::Unconstrained,
            K::BatchNormalization
            | K::Cast
            | K::Clip
            | K::Exp
            | K::Gather
            | K::LayerNormalization
            | K::LeakyRelu
            | K::Log
            | K::Pad
            | K::Pow
            | K::ReduceMean
            | K::ResizeNearest
            | K::Slice
            | K::Squeeze
            | K::Stack
            | K::Tile => Policy::Unsupported,
        }
    }

    /// Minimum number of (inputs, outputs) the policy reads.
    fn arity(&self) -> (usize, usize) {
        match self {
            Policy::Accumulator => (3, 1),
            Policy::Merge | Policy::Passthrough => (1, 1),
            Policy::FanOut => (1, 0),
            Policy::Unconstrained | Policy::Unsupported => (0, 0),
        }
    }
}

/// Summary of one run of the pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassStats {
    /// operations visited, requants inserted by this run are not visited
    pub visited: usize,
    /// operations whose bias or edges were changed
    pub changed: usize,
    /// requant operations added to the model
    pub requants_inserted: usize,
}

impl PassStats {
    pub fn is_noop(&self) -> bool {
        self.changed == 0 && self.requants_inserted == 0
    }
}

#[derive(Clone, Debug, Default)]
pub struct RestrictPass {
    config: RestrictConfig,
}

impl RestrictPass {
    pub fn new(config: RestrictConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RestrictConfig {
        &self.config
    }

    /// Runs the pass over `model`. The model is checked before anything is rewritten; after
    /// that, an error means the model is partially rewritten and must be discarded.
    pub fn run(&self, model: &mut Model) -> Result<PassStats, RestrictError> {
        model.validate()?;
        let operations = model.topological_order()?;
        let num_operations = model.num_operations();
        let mut stats = PassStats::default();
        for id in operations {
            let operation = model.operation(id)?.clone();
            debug!(
                "Converting {} {} [{}] -> [{}] ...",
                id,
                operation.kind(),
                operation.inputs().iter().join(", "),
                operation.outputs().iter().join(", ")
            );
            stats.visited += 1;
            if self.apply(model, id, &operation)? {
                stats.changed += 1;
            }
        }
        stats.requants_inserted = model.num_operations() - num_operations;
        info!(
            "Restricted quantization parameters: {} operations visited, {} changed, {} requants inserted",
            stats.visited, stats.changed, stats.requants_inserted
        );
        Ok(stats)
    }

    fn apply(
        &self,
        model: &mut Model,
        id: OperationId,
        operation: &Operation,
    ) -> Result<bool, RestrictError> {
        let kind = operation.kind();
        let policy = Policy::for_kind(kind);
        let (min_inputs, min_outputs) = policy.arity();
        let (inputs, outputs) = (operation.inputs(), operation.outputs());
        if inputs.len() < min_inputs || outputs.len() < min_outputs {
            return Err(RestrictError::Arity {
                operation: id,
                kind,
                min_inputs,
                min_outputs,
                inputs: inputs.len(),
                outputs: outputs.len(),
            });
        }
        let tolerance = self.config.scale_tolerance;
        let mut changed = false;
        match policy {
            Policy::Accumulator => {
                changed = rescale_bias_and_output(
                    model,
                    id,
                    inputs[0],
                    inputs[1],
                    inputs[2],
                    outputs[0],
                    &self.config,
                )?;
            }
            Policy::Merge => {
                // the last input is left as is. Edges are read from the model on each step: a
                // requant rewires every slot reading the same operand.
                for i in 0..inputs.len() - 1 {
                    let input = model.operation(id)?.inputs()[i];
                    changed |= align_scale_to_operand(
                        model,
                        id,
                        input,
                        outputs[0],
                        EdgeSide::Input,
                        tolerance,
                    )?;
                }
            }
            Policy::Passthrough => {
                changed = align_scale_to_operand(
                    model,
                    id,
                    inputs[0],
                    outputs[0],
                    EdgeSide::Input,
                    tolerance,
                )?;
            }
            Policy::FanOut => {
                for i in 0..outputs.len() {
                    let output = model.operation(id)?.outputs()[i];
                    changed |= align_scale_to_operand(
                        model,
                        id,
                        output,
                        inputs[0],
                        EdgeSide::Output,
                        tolerance,
                    )?;
                }
            }
            Policy::Unconstrained => {}
            Policy::Unsupported => {
                return Err(RestrictError::UnsupportedOperation {
                    operation: id,
                    kind,
                });
            }
        }
        Ok(changed)
    }
}

/// Restricts the quantization parameters of `model` with the default thresholds.
/// On error the model must not be handed to the next stage.
pub fn restrict_input_output_quant_params(model: &mut Model) -> Result<(), RestrictError> {
    RestrictPass::default().run(model).map(|_| ())
}
