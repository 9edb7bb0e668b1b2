//! Graph of a quantized model, stored as an arena of operands and operations.
//!
//! Operations refer to operands by [`OperandId`], so an operand read by several operations is
//! shared by reference: rewriting the edge list of one operation never touches the edges of
//! the others.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::quantization::QuantParams;

mod error;
mod operand;
mod operation;
pub mod topo;

pub use error::ModelError;
pub use operand::{ConstantBuffer, Operand, OperandId};
pub use operation::{Operation, OperationId, OperationKind};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    operands: Vec<Operand>,
    operations: Vec<Operation>,
    /// Operands fed by the caller of the model
    #[serde(default)]
    inputs: Vec<OperandId>,
    /// Operands returned to the caller of the model
    #[serde(default)]
    outputs: Vec<OperandId>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_operand(&mut self, operand: Operand) -> OperandId {
        self.operands.push(operand);
        OperandId(self.operands.len() - 1)
    }

    /// Add an operation reading `inputs` and writing `outputs`, all of which must already be
    /// stored in the model.
    pub fn add_operation(
        &mut self,
        kind: OperationKind,
        inputs: Vec<OperandId>,
        outputs: Vec<OperandId>,
    ) -> Result<OperationId, ModelError> {
        for id in inputs.iter().chain(outputs.iter()) {
            self.operand(*id)?;
        }
        self.operations.push(Operation::new(kind, inputs, outputs));
        Ok(OperationId(self.operations.len() - 1))
    }

    pub fn set_inputs(&mut self, inputs: Vec<OperandId>) -> Result<(), ModelError> {
        for id in &inputs {
            self.operand(*id)?;
        }
        self.inputs = inputs;
        Ok(())
    }

    pub fn set_outputs(&mut self, outputs: Vec<OperandId>) -> Result<(), ModelError> {
        for id in &outputs {
            self.operand(*id)?;
        }
        self.outputs = outputs;
        Ok(())
    }

    pub fn inputs(&self) -> &[OperandId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OperandId] {
        &self.outputs
    }

    pub fn num_operands(&self) -> usize {
        self.operands.len()
    }

    pub fn num_operations(&self) -> usize {
        self.operations.len()
    }

    pub fn operand(&self, id: OperandId) -> Result<&Operand, ModelError> {
        self.operands
            .get(id.0)
            .ok_or(ModelError::UnknownOperand(id))
    }

    pub fn operand_mut(&mut self, id: OperandId) -> Result<&mut Operand, ModelError> {
        self.operands
            .get_mut(id.0)
            .ok_or(ModelError::UnknownOperand(id))
    }

    pub fn operation(&self, id: OperationId) -> Result<&Operation, ModelError> {
        self.operations
            .get(id.0)
            .ok_or(ModelError::UnknownOperation(id))
    }

    fn operation_mut(&mut self, id: OperationId) -> Result<&mut Operation, ModelError> {
        self.operations
            .get_mut(id.0)
            .ok_or(ModelError::UnknownOperation(id))
    }

    pub fn operands(&self) -> impl Iterator<Item = (OperandId, &Operand)> {
        self.operands
            .iter()
            .enumerate()
            .map(|(i, operand)| (OperandId(i), operand))
    }

    pub fn operations(&self) -> impl Iterator<Item = (OperationId, &Operation)> {
        self.operations
            .iter()
            .enumerate()
            .map(|(i, op)| (OperationId(i), op))
    }

    /// Operation writing `operand`, `None` for model inputs and constants.
    pub fn producer_of(&self, operand: OperandId) -> Option<OperationId> {
        self.operations()
            .find(|(_, op)| op.outputs.contains(&operand))
            .map(|(id, _)| id)
    }

    pub fn is_model_input(&self, operand: OperandId) -> bool {
        self.inputs.contains(&operand)
    }

    /// Returns the operations in an order where producers always come before consumers.
    pub fn topological_order(&self) -> Result<Vec<OperationId>, ModelError> {
        topo::topological_order(self)
    }

    /// Checks the structural invariants the graph rewrites rely on: every edge points to a
    /// stored operand, quantized scales are finite and strictly positive, and every operand
    /// has at most one producer.
    pub fn validate(&self) -> Result<(), ModelError> {
        for id in self.inputs.iter().chain(self.outputs.iter()) {
            self.operand(*id)?;
        }
        for (id, operand) in self.operands() {
            if let Some(scale) = operand.quant.scale() {
                if !(scale.is_finite() && scale > 0.0) {
                    return Err(ModelError::InvalidScale { operand: id, scale });
                }
            }
        }
        let mut producers = HashMap::new();
        for (op_id, op) in self.operations() {
            for id in op.inputs.iter() {
                self.operand(*id)?;
            }
            for id in op.outputs.iter() {
                self.operand(*id)?;
                if let Some(first) = producers.insert(*id, op_id) {
                    return Err(ModelError::MultipleProducers {
                        operand: *id,
                        producers: (first, op_id),
                    });
                }
            }
        }
        Ok(())
    }

    /// Replace `old` by `new` in the input list of each operation of `operations`. Every
    /// other operation keeps reading `old`.
    pub fn update_operation_input_operands(
        &mut self,
        operations: &[OperationId],
        old: OperandId,
        new: OperandId,
    ) -> Result<(), ModelError> {
        self.operand(new)?;
        for id in operations {
            self.operation_mut(*id)?
                .inputs
                .iter_mut()
                .filter(|input| **input == old)
                .for_each(|input| *input = new);
        }
        Ok(())
    }

    /// Replace `old` by `new` in the output list of `operation`.
    pub fn update_operation_output_operands(
        &mut self,
        operation: OperationId,
        old: OperandId,
        new: OperandId,
    ) -> Result<(), ModelError> {
        self.operand(new)?;
        self.operation_mut(operation)?
            .outputs
            .iter_mut()
            .filter(|output| **output == old)
            .for_each(|output| *output = new);
        Ok(())
    }

    /// Requantization on the producer side of `reference`: a new operand quantized with
    /// `quant` is created together with a requant operation converting it into `reference`.
    /// The caller is expected to make the producer of `reference` write the returned operand
    /// instead; consumers of `reference` are left as they are.
    pub fn insert_requant_operation(
        &mut self,
        reference: OperandId,
        quant: QuantParams,
    ) -> Result<OperandId, ModelError> {
        if self.is_model_input(reference) {
            return Err(ModelError::ParameterError(format!(
                "cannot insert a requant operation before model input {reference}"
            )));
        }
        let requantized = self.operand(reference)?.requantized(quant);
        let requantized = self.add_operand(requantized);
        self.add_operation(OperationKind::Requant, vec![requantized], vec![reference])?;
        Ok(requantized)
    }

    /// Requantization on the consumer side of `reference`: a requant operation reads
    /// `reference` and writes a new operand quantized with `quant`, which is returned. The
    /// caller decides which consumers are moved to the new operand.
    pub fn append_requant_operation(
        &mut self,
        reference: OperandId,
        quant: QuantParams,
    ) -> Result<OperandId, ModelError> {
        let requantized = self.operand(reference)?.requantized(quant);
        let requantized = self.add_operand(requantized);
        self.add_operation(OperationKind::Requant, vec![reference], vec![requantized])?;
        Ok(requantized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{asymm_operand, float_operand};

    #[test]
    fn test_ids_follow_insertion_order() -> anyhow::Result<()> {
        let mut model = Model::new();
        let a = model.add_operand(float_operand(vec![2]));
        let b = model.add_operand(float_operand(vec![2]));
        let op = model.add_operation(OperationKind::Relu, vec![a], vec![b])?;
        assert_eq!((a.index(), b.index(), op.index()), (0, 1, 0));
        assert_eq!(a.to_string(), "%0");
        assert_eq!(op.to_string(), "#0");
        assert_eq!(model.producer_of(b), Some(op));
        assert_eq!(model.producer_of(a), None);
        Ok(())
    }

    #[test]
    fn test_dangling_operand_is_rejected() {
        let mut model = Model::new();
        let a = model.add_operand(float_operand(vec![2]));
        let result = model.add_operation(OperationKind::Relu, vec![a], vec![OperandId(7)]);
        assert_eq!(result, Err(ModelError::UnknownOperand(OperandId(7))));
    }

    #[test]
    fn test_append_requant_rewires_only_selected_consumer() -> anyhow::Result<()> {
        let mut model = Model::new();
        let shared = model.add_operand(asymm_operand(0.5, 3, vec![1, 8]));
        let out_a = model.add_operand(asymm_operand(1.0, 0, vec![1, 8]));
        let out_b = model.add_operand(asymm_operand(0.5, 3, vec![1, 8]));
        let op_a = model.add_operation(OperationKind::Relu, vec![shared], vec![out_a])?;
        let op_b = model.add_operation(OperationKind::Tanh, vec![shared], vec![out_b])?;

        let requantized = model.append_requant_operation(shared, QuantParams::asymm(1.0, 0))?;
        model.update_operation_input_operands(&[op_a], shared, requantized)?;

        assert_eq!(model.operation(op_a)?.inputs(), &[requantized]);
        assert_eq!(model.operation(op_b)?.inputs(), &[shared]);
        let requant = model.producer_of(requantized).expect("requant must exist");
        assert_eq!(model.operation(requant)?.kind(), OperationKind::Requant);
        assert_eq!(model.operation(requant)?.inputs(), &[shared]);
        // the original operand keeps its parameters
        assert_eq!(model.operand(shared)?.quant(), &QuantParams::asymm(0.5, 3));
        assert_eq!(model.operand(requantized)?.shape(), &[1, 8]);
        model.validate()?;
        Ok(())
    }

    #[test]
    fn test_insert_requant_moves_producer() -> anyhow::Result<()> {
        let mut model = Model::new();
        let input = model.add_operand(asymm_operand(0.5, 0, vec![4]));
        let output = model.add_operand(asymm_operand(0.25, 0, vec![4]));
        let next = model.add_operand(asymm_operand(0.25, 0, vec![4]));
        let op = model.add_operation(OperationKind::Relu, vec![input], vec![output])?;
        let consumer = model.add_operation(OperationKind::Tanh, vec![output], vec![next])?;

        let requantized = model.insert_requant_operation(output, QuantParams::asymm(0.5, 0))?;
        model.update_operation_output_operands(op, output, requantized)?;

        assert_eq!(model.operation(op)?.outputs(), &[requantized]);
        let requant = model.producer_of(output).expect("requant must produce output");
        assert_eq!(model.operation(requant)?.inputs(), &[requantized]);
        assert_eq!(model.operation(consumer)?.inputs(), &[output]);
        assert_eq!(
            model.topological_order()?,
            vec![op, requant, consumer]
        );
        model.validate()?;
        Ok(())
    }

    #[test]
    fn test_insert_requant_before_model_input_fails() -> anyhow::Result<()> {
        let mut model = Model::new();
        let input = model.add_operand(asymm_operand(0.5, 0, vec![4]));
        model.set_inputs(vec![input])?;
        assert!(matches!(
            model.insert_requant_operation(input, QuantParams::asymm(1.0, 0)),
            Err(ModelError::ParameterError(_))
        ));
        Ok(())
    }

    #[test]
    fn test_validate_rejects_bad_scale() {
        let mut model = Model::new();
        let bad = model.add_operand(asymm_operand(0.0, 0, vec![4]));
        assert_eq!(
            model.validate(),
            Err(ModelError::InvalidScale {
                operand: bad,
                scale: 0.0
            })
        );
    }

    #[test]
    fn test_validate_rejects_second_producer() -> anyhow::Result<()> {
        let mut model = Model::new();
        let a = model.add_operand(float_operand(vec![4]));
        let b = model.add_operand(float_operand(vec![4]));
        let first = model.add_operation(OperationKind::Relu, vec![a], vec![b])?;
        let second = model.add_operation(OperationKind::Tanh, vec![a], vec![b])?;
        assert_eq!(
            model.validate(),
            Err(ModelError::MultipleProducers {
                operand: b,
                producers: (first, second)
            })
        );
        Ok(())
    }
}
