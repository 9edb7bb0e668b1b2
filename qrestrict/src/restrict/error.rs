use crate::model::{ModelError, OperandId, OperationId, OperationKind};

/// Fatal conditions of the restriction pass. Any of them leaves the model partially rewritten
/// and it must be discarded by the caller.
#[derive(thiserror::Error, Debug)]
pub enum RestrictError {
    #[error(
        "Missing the processing of {kind} ({operation}) for applying the constraints to quantization parameters"
    )]
    UnsupportedOperation {
        operation: OperationId,
        kind: OperationKind,
    },
    #[error("Bias operand {operand} must be 1-D to be requantized, found rank {rank}")]
    BiasRank { operand: OperandId, rank: usize },
    #[error("Bias operand {operand} cannot be requantized: {reason}")]
    BiasBuffer { operand: OperandId, reason: String },
    #[error(
        "{kind} ({operation}) expects at least {min_inputs} inputs and {min_outputs} outputs, found {inputs} and {outputs}"
    )]
    Arity {
        operation: OperationId,
        kind: OperationKind,
        min_inputs: usize,
        min_outputs: usize,
        inputs: usize,
        outputs: usize,
    },
    #[error("Invalid model: {0}")]
    Model(#[from] ModelError),
}
