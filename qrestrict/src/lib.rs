//! Quantization parameter restriction for graphs lowered onto fixed-point accelerators.
//!
//! The entry point is [`restrict_input_output_quant_params`], to be run after calibration
//! and right before the model is converted into the accelerator graph.
pub mod io;
pub mod model;
pub mod quantization;
pub mod restrict;
#[cfg(test)]
pub(crate) mod testing;

pub use model::{
    ConstantBuffer, Model, ModelError, Operand, OperandId, Operation, OperationId, OperationKind,
};
pub use quantization::QuantParams;
pub use restrict::{
    PassStats, Policy, RestrictConfig, RestrictError, RestrictPass,
    restrict_input_output_quant_params,
};
