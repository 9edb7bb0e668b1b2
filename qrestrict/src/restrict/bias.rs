//! Enforces the scale relationship of accumulator operations (convolution, fully connected):
//! the integer accumulator is implicitly at scale `input_scale * weight_scale`, so the bias has
//! to be quantized at exactly that scale, and the output scale must be strictly larger for the
//! accumulator not to saturate.

use tracing::debug;

use super::{
    RestrictConfig, RestrictError,
    align::{EdgeSide, align_scale},
};
use crate::{
    model::{ConstantBuffer, Model, OperandId, OperationId},
    quantization::{self, QuantParams},
};

/// Returns `true` if the bias was requantized or a requant was inserted on the output.
/// Skipped unless input, weight and output are asymm per layer and the bias is symm per
/// layer. A shared bias is rescaled for every operation reading it.
pub fn rescale_bias_and_output(
    model: &mut Model,
    operation: OperationId,
    input: OperandId,
    weight: OperandId,
    bias: OperandId,
    output: OperandId,
    config: &RestrictConfig,
) -> Result<bool, RestrictError> {
    let (
        QuantParams::AsymmPerLayer {
            scale: input_scale, ..
        },
        QuantParams::AsymmPerLayer {
            scale: weight_scale,
            ..
        },
        QuantParams::SymmPerLayer { scale: bias_scale },
        QuantParams::AsymmPerLayer {
            scale: output_scale,
            zero_point: output_zero_point,
        },
    ) = (
        *model.operand(input)?.quant(),
        *model.operand(weight)?.quant(),
        *model.operand(bias)?.quant(),
        *model.operand(output)?.quant(),
    )
    else {
        return Ok(false);
    };

    let accumulator_scale = input_scale as f64 * weight_scale as f64;
    let mut updated = false;
    if (accumulator_scale - bias_scale as f64).abs() > config.bias_scale_tolerance {
        debug!(
            "Requantize bias operand {}: scale {} -> {}",
            bias, bias_scale, accumulator_scale
        );
        rescale_bias(model, bias, bias_scale, accumulator_scale as f32)?;
        updated = true;
    }

    if output_scale as f64 > accumulator_scale {
        return Ok(updated);
    }
    // Make the producer write an operand with output_scale = input_scale * weight_scale + margin.
    // Zero tolerance: with the default one, an output just below the accumulator scale would be
    // kept and still saturate (test_output_just_below_accumulator_scale_gets_requant).
    let aligned = align_scale(
        model,
        operation,
        output,
        (accumulator_scale + config.output_scale_margin) as f32,
        output_zero_point,
        EdgeSide::Output,
        0.0,
    )?;
    Ok(updated | aligned)
}

/// Moves the int32 data of `bias` from `old_scale` to `new_scale` in place.
fn rescale_bias(
    model: &mut Model,
    bias: OperandId,
    old_scale: f32,
    new_scale: f32,
) -> Result<(), RestrictError> {
    let operand = model.operand_mut(bias)?;
    if operand.rank() != 1 {
        return Err(RestrictError::BiasRank {
            operand: bias,
            rank: operand.rank(),
        });
    }
    let channels = operand.shape[0];
    let values = match operand.buffer.as_mut() {
        Some(ConstantBuffer::Int32(values)) => values,
        Some(other) => {
            return Err(RestrictError::BiasBuffer {
                operand: bias,
                reason: format!("expected int32 data, found {}", other.dtype()),
            });
        }
        None => {
            return Err(RestrictError::BiasBuffer {
                operand: bias,
                reason: "no constant data".to_string(),
            });
        }
    };
    if values.len() != channels {
        return Err(RestrictError::BiasBuffer {
            operand: bias,
            reason: format!("{} values for {} channels", values.len(), channels),
        });
    }
    let real = quantization::dequantize(values, old_scale, 0);
    *values = quantization::quantize(&real, new_scale, 0);
    operand.quant = QuantParams::symm(new_scale);
    Ok(())
}
