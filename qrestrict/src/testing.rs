use crate::{
    model::{ConstantBuffer, Model, Operand, OperandId, OperationId, OperationKind},
    quantization::QuantParams,
};

pub fn float_operand(shape: Vec<usize>) -> Operand {
    Operand::new(QuantParams::None, shape)
}

pub fn asymm_operand(scale: f32, zero_point: i32, shape: Vec<usize>) -> Operand {
    Operand::new(QuantParams::asymm(scale, zero_point), shape)
}

/// Rank-1 int32 bias with symmetric quantization.
pub fn symm_bias(scale: f32, values: Vec<i32>) -> Operand {
    Operand::new(QuantParams::symm(scale), vec![values.len()])
        .with_buffer(ConstantBuffer::Int32(values))
}

pub fn asymm_params(model: &Model, operand: OperandId) -> (f32, i32) {
    match model.operand(operand).map(|o| *o.quant()) {
        Ok(QuantParams::AsymmPerLayer { scale, zero_point }) => (scale, zero_point),
        other => panic!("operand {operand} is not asymm per layer: {other:?}"),
    }
}

/// Operands of a single accumulator operation built by [`accumulator_model`].
pub struct Accumulator {
    pub operation: OperationId,
    pub input: OperandId,
    pub weight: OperandId,
    pub bias: OperandId,
    pub output: OperandId,
}

/// Model made of one accumulator (`input`, `weight`, `bias`) -> `output`. The weight has
/// zero point 0 and the input/output use zero point 0 as well.
pub fn accumulator_model(
    kind: OperationKind,
    input_scale: f32,
    weight_scale: f32,
    bias: Operand,
    output_scale: f32,
) -> (Model, Accumulator) {
    let channels = bias.shape().first().copied().unwrap_or(1);
    let mut model = Model::new();
    let input = model.add_operand(asymm_operand(input_scale, 0, vec![1, 16]));
    let weight = model.add_operand(
        asymm_operand(weight_scale, 0, vec![channels, 16])
            .with_buffer(ConstantBuffer::Int8(vec![1; channels * 16])),
    );
    let bias = model.add_operand(bias);
    let output = model.add_operand(asymm_operand(output_scale, 0, vec![1, channels]));
    let operation = model
        .add_operation(kind, vec![input, weight, bias], vec![output])
        .expect("operands were just added");
    model.set_inputs(vec![input]).expect("input exists");
    model.set_outputs(vec![output]).expect("output exists");
    (
        model,
        Accumulator {
            operation,
            input,
            weight,
            bias,
            output,
        },
    )
}
