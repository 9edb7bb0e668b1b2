//! Forward ordering of the operations of a [`Model`].

use std::collections::{BTreeSet, HashMap};

use super::{Model, ModelError, OperandId, OperationId};

/// Returns the operations of `model` such that every operation comes after the operations
/// producing its inputs. Among the operations ready at the same time the one with the
/// smallest id goes first, so the order only depends on the model.
pub fn topological_order(model: &Model) -> Result<Vec<OperationId>, ModelError> {
    let producers: HashMap<OperandId, OperationId> = model
        .operations()
        .flat_map(|(id, op)| op.outputs().iter().map(move |out| (*out, id)))
        .collect();

    let mut pending = vec![0usize; model.num_operations()];
    let mut successors: Vec<Vec<OperationId>> = vec![Vec::new(); model.num_operations()];
    for (id, op) in model.operations() {
        for input in op.inputs() {
            if let Some(producer) = producers.get(input) {
                pending[id.index()] += 1;
                successors[producer.index()].push(id);
            }
        }
    }

    let mut ready: BTreeSet<OperationId> = model
        .operations()
        .filter(|(id, _)| pending[id.index()] == 0)
        .map(|(id, _)| id)
        .collect();
    let mut order = Vec::with_capacity(model.num_operations());
    while let Some(id) = ready.pop_first() {
        order.push(id);
        for next in &successors[id.index()] {
            pending[next.index()] -= 1;
            if pending[next.index()] == 0 {
                ready.insert(*next);
            }
        }
    }

    if order.len() != model.num_operations() {
        return Err(ModelError::Cyclic {
            remaining: model.num_operations() - order.len(),
        });
    }
    Ok(order)
}
