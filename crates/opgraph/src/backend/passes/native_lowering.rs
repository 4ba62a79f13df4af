use std::collections::HashMap;

use log::debug;

use crate::backend::dialect::{
    Instruction, Kernel, Module, NativeOp, Operation, Stage, StandardOp, TensorType, ValueId,
};
use crate::backend::shape_helpers::{
    broadcast_input_strides, checked_element_count_or_error, contiguous_strides_or_error,
    static_dims_or_error,
};

use super::{expect_stage, ModulePass, PassError, PassResult};

/// Lowers standard-stage modules to native kernels. Every value must have a static shape and a
/// known element type.
#[derive(Default)]
pub struct NativeLoweringPass;

impl NativeLoweringPass {
    const NAME: &'static str = "convert-standard-to-native";
}

impl ModulePass for NativeLoweringPass {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run(&self, module: &mut Module) -> Result<PassResult, PassError> {
        expect_stage(Self::NAME, module, Stage::Standard)?;
        let function = &mut module.function;

        let mut dims: HashMap<ValueId, Vec<usize>> = HashMap::new();
        for (id, ty) in function.parameter_ids.iter().zip(function.parameters.iter()) {
            dims.insert(*id, static_type_dims(ty, || format!("parameter {id}"))?);
        }

        let mut lowered = 0usize;
        for inst in &mut function.body {
            let output_dims = static_type_dims(&inst.output, || describe(inst))?;
            let output_strides = strides(&output_dims, inst)?;
            let operand_dims = |index: usize| {
                dims.get(&inst.operands[index])
                    .ok_or_else(|| unsupported(inst, "operand has no static definition"))
            };

            let Operation::Standard(op) = &inst.op else {
                return Err(unsupported(inst, "operation is not in the standard op family"));
            };
            let kernel = match op {
                StandardOp::Constant(literal) => Kernel::Constant(literal.clone()),
                StandardOp::Add => Kernel::Add {
                    elements: checked_element_count_or_error(&output_dims, || {
                        unsupported(inst, "element count overflows")
                    })?,
                },
                StandardOp::ReduceSum { axes } => Kernel::ReduceSum {
                    axes: axes.clone(),
                    input_strides: strides(operand_dims(0)?, inst)?,
                    output_strides,
                },
                StandardOp::BroadcastInDim {
                    broadcast_dimensions,
                } => {
                    let input_dims = operand_dims(0)?;
                    Kernel::Broadcast {
                        input_strides: broadcast_input_strides(
                            input_dims,
                            &strides(input_dims, inst)?,
                            broadcast_dimensions,
                            output_dims.len(),
                        ),
                        output_strides,
                    }
                }
                StandardOp::DynamicBroadcastInDim { .. } => {
                    return Err(unsupported(inst, "dynamic broadcast has no native kernel"));
                }
                StandardOp::Concat { axis } => {
                    let mut offsets = Vec::with_capacity(inst.operands.len());
                    let mut offset = 0usize;
                    for index in 0..inst.operands.len() {
                        offsets.push(offset);
                        offset += operand_dims(index)?[*axis];
                    }
                    Kernel::Concat {
                        axis: *axis,
                        offsets,
                        output_strides,
                    }
                }
                StandardOp::Scatter { axis } => Kernel::Scatter {
                    axis: *axis,
                    data_strides: strides(operand_dims(0)?, inst)?,
                    update_strides: strides(operand_dims(2)?, inst)?,
                },
            };
            let Some(output_bytes) = inst.output.byte_len() else {
                return Err(unsupported(inst, "output byte size overflows"));
            };

            dims.insert(inst.id, output_dims);
            inst.op = Operation::Native(NativeOp {
                kernel,
                output_bytes,
            });
            lowered += 1;
        }

        debug!("{}: lowered {lowered} instructions", Self::NAME);
        module.stage = Stage::Native;
        Ok(PassResult {
            changed: true,
            iterations: 1,
            rewrites_applied: lowered,
            erased_insts: 0,
        })
    }
}

fn static_type_dims(
    ty: &TensorType,
    what: impl FnOnce() -> String,
) -> Result<Vec<usize>, PassError> {
    let what = what();
    if !ty.element_type.is_static() {
        return Err(PassError::Unsupported {
            pass: NativeLoweringPass::NAME,
            instruction: what,
            reason: format!("element type of {ty} is dynamic"),
        });
    }
    static_dims_or_error(&ty.shape, |axis| PassError::Unsupported {
        pass: NativeLoweringPass::NAME,
        instruction: what.clone(),
        reason: match axis {
            Some(axis) => format!("dimension {axis} of {ty} is dynamic"),
            None => format!("rank of {ty} is dynamic"),
        },
    })
}

fn strides(dims: &[usize], inst: &Instruction) -> Result<Vec<usize>, PassError> {
    contiguous_strides_or_error(dims, || unsupported(inst, "strides overflow"))
}

fn describe(inst: &Instruction) -> String {
    format!("{} ({})", inst.id, inst.op.name())
}

fn unsupported(inst: &Instruction, reason: &str) -> PassError {
    PassError::Unsupported {
        pass: NativeLoweringPass::NAME,
        instruction: describe(inst),
        reason: reason.to_string(),
    }
}
