//! Module containing code defining the [`ModelError`] type.

use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
};

use super::{OperandId, OperationId};

#[derive(Debug, Clone, PartialEq)]
/// Errors relating to the structure of a [`super::Model`].
pub enum ModelError {
    /// An edge list references an operand that is not stored in the model.
    UnknownOperand(OperandId),
    /// An operation id that is not stored in the model.
    UnknownOperation(OperationId),
    /// A quantized operand whose scale is not strictly positive (or not finite).
    InvalidScale { operand: OperandId, scale: f32 },
    /// The operand is written by more than one operation.
    MultipleProducers {
        operand: OperandId,
        producers: (OperationId, OperationId),
    },
    /// The operations cannot be ordered, `remaining` of them sit on a cycle or behind one.
    Cyclic { remaining: usize },
    /// Error variant returned when parameters passed to a model method are incorrect.
    ParameterError(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ModelError::UnknownOperand(id) => write!(f, "operand {id} not found in model"),
            ModelError::UnknownOperation(id) => write!(f, "operation {id} not found in model"),
            ModelError::InvalidScale { operand, scale } => {
                write!(f, "operand {operand} has a non positive scale {scale}")
            }
            ModelError::MultipleProducers {
                operand,
                producers: (first, second),
            } => write!(
                f,
                "operand {operand} is produced by both {first} and {second}"
            ),
            ModelError::Cyclic { remaining } => write!(
                f,
                "model is not acyclic: {remaining} operations could not be ordered"
            ),
            ModelError::ParameterError(s) => write!(f, "Incorrect parameters fed to model: {}", s),
        }
    }
}

impl Error for ModelError {}
