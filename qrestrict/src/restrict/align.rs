//! Alignment of the affine quantization of one operand to a reference (scale, zero point).

use derive_more::Display;
use tracing::debug;

use super::RestrictError;
use crate::{
    model::{Model, OperandId, OperationId},
    quantization::QuantParams,
};

/// Side of the operation on which the aligned operand sits.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum EdgeSide {
    /// The operand is read by the operation. The requant is appended after the operand and
    /// only this operation is moved to the requantized operand.
    #[display("input")]
    Input,
    /// The operand is written by the operation. The operation writes a requantized operand
    /// instead and a requant converts it back into the original one.
    #[display("output")]
    Output,
}

/// Makes `target`, an input or output of `operation`, carry (`scale`, `zero_point`).
/// Returns `true` if a requant operation was spliced in. The quantization stored on
/// `target` is never modified; non asymm per layer targets are skipped.
pub fn align_scale(
    model: &mut Model,
    operation: OperationId,
    target: OperandId,
    scale: f32,
    zero_point: i32,
    side: EdgeSide,
    tolerance: f64,
) -> Result<bool, RestrictError> {
    let QuantParams::AsymmPerLayer {
        scale: target_scale,
        zero_point: target_zero_point,
    } = *model.operand(target)?.quant()
    else {
        return Ok(false);
    };
    if ((target_scale - scale).abs() as f64) <= tolerance && target_zero_point == zero_point {
        return Ok(false);
    }
    debug!(
        "Requantize {} operand {} of {}: scale {} -> {}, zero_point {} -> {}",
        side, target, operation, target_scale, scale, target_zero_point, zero_point
    );
    let quant = QuantParams::asymm(scale, zero_point);
    match side {
        EdgeSide::Output => {
            let requantized = model.insert_requant_operation(target, quant)?;
            model.update_operation_output_operands(operation, target, requantized)?;
        }
        EdgeSide::Input => {
            let requantized = model.append_requant_operation(target, quant)?;
            model.update_operation_input_operands(&[operation], target, requantized)?;
        }
    }
    Ok(true)
}

/// Same as [`align_scale`], taking the parameters from `reference`. Skipped if `reference`
/// is not asymm per layer.
pub fn align_scale_to_operand(
    model: &mut Model,
    operation: OperationId,
    target: OperandId,
    reference: OperandId,
    side: EdgeSide,
    tolerance: f64,
) -> Result<bool, RestrictError> {
    let QuantParams::AsymmPerLayer { scale, zero_point } = *model.operand(reference)?.quant()
    else {
        return Ok(false);
    };
    align_scale(model, operation, target, scale, zero_point, side, tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::OperationKind,
        restrict::DEFAULT_SCALE_TOLERANCE,
        testing::{asymm_operand, asymm_params, float_operand},
    };

    fn relu_model(input: (f32, i32), output: (f32, i32)) -> (Model, OperationId, OperandId, OperandId) {
        let mut model = Model::new();
        let i = model.add_operand(asymm_operand(input.0, input.1, vec![1, 4]));
        let o = model.add_operand(asymm_operand(output.0, output.1, vec![1, 4]));
        let op = model
            .add_operation(OperationKind::Relu, vec![i], vec![o])
            .expect("valid operation");
        (model, op, i, o)
    }

    #[test]
    fn test_within_tolerance_is_unchanged() -> anyhow::Result<()> {
        let (mut model, op, input, output) = relu_model((0.5, 3), (0.500004, 3));
        let before = model.clone();
        let changed = align_scale_to_operand(
            &mut model,
            op,
            input,
            output,
            EdgeSide::Input,
            DEFAULT_SCALE_TOLERANCE,
        )?;
        assert!(!changed);
        assert_eq!(model, before);
        Ok(())
    }

    #[test]
    fn test_zero_point_mismatch_requantizes_input() -> anyhow::Result<()> {
        let (mut model, op, input, output) = relu_model((0.5, 3), (0.5, 4));
        let changed = align_scale_to_operand(
            &mut model,
            op,
            input,
            output,
            EdgeSide::Input,
            DEFAULT_SCALE_TOLERANCE,
        )?;
        assert!(changed);
        let requantized = model.operation(op)?.inputs()[0];
        assert_ne!(requantized, input);
        assert_eq!(asymm_params(&model, requantized), (0.5, 4));
        assert_eq!(asymm_params(&model, input), (0.5, 3));
        Ok(())
    }

    #[test]
    fn test_output_side_keeps_original_operand_for_consumers() -> anyhow::Result<()> {
        let (mut model, op, input, output) = relu_model((0.5, 0), (0.25, 0));
        let changed = align_scale(
            &mut model,
            op,
            output,
            0.5,
            0,
            EdgeSide::Output,
            DEFAULT_SCALE_TOLERANCE,
        )?;
        assert!(changed);
        let written = model.operation(op)?.outputs()[0];
        assert_eq!(asymm_params(&model, written), (0.5, 0));
        assert_eq!(asymm_params(&model, output), (0.25, 0));
        let requant = model.producer_of(output).expect("requant writes the output");
        assert_eq!(model.operation(requant)?.inputs(), &[written]);
        assert_eq!(model.operation(op)?.inputs(), &[input]);
        Ok(())
    }

    #[test]
    fn test_non_quantized_operands_are_skipped() -> anyhow::Result<()> {
        let mut model = Model::new();
        let input = model.add_operand(float_operand(vec![4]));
        let output = model.add_operand(asymm_operand(0.5, 0, vec![4]));
        let op = model.add_operation(OperationKind::Relu, vec![input], vec![output])?;
        let before = model.clone();
        // non quantized target
        assert!(!align_scale_to_operand(
            &mut model,
            op,
            input,
            output,
            EdgeSide::Input,
            DEFAULT_SCALE_TOLERANCE
        )?);
        // non quantized reference
        assert!(!align_scale_to_operand(
            &mut model,
            op,
            output,
            input,
            EdgeSide::Output,
            DEFAULT_SCALE_TOLERANCE
        )?);
        assert_eq!(model, before);
        Ok(())
    }
}
