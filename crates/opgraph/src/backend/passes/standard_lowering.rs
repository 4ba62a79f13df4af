use log::debug;

use crate::backend::dialect::{
    GraphOp, Instruction, Module, Operation, Stage, StandardOp, TensorType, ValueId,
};
use crate::ops::autobroadcast::AutoBroadcastType;
use crate::tensor::{axis_vector, AxisVector};

use super::{expect_stage, ModulePass, PassError, PassResult};

/// Rewrites graph-stage operations into the standard op family. Every broadcast variant becomes
/// `broadcast_in_dim` with an explicit operand-to-result dimension map, or
/// `dynamic_broadcast_in_dim` when the result shape is not static.
#[derive(Default)]
pub struct StandardLoweringPass;

impl StandardLoweringPass {
    const NAME: &'static str = "convert-graph-to-standard";
}

impl ModulePass for StandardLoweringPass {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run(&self, module: &mut Module) -> Result<PassResult, PassError> {
        expect_stage(Self::NAME, module, Stage::Graph)?;
        let function = &mut module.function;
        let mut lowering = Lowering {
            next_value_id: function.next_value_id(),
            body: Vec::with_capacity(function.body.len()),
            parameters: function
                .parameter_ids
                .iter()
                .copied()
                .zip(function.parameters.iter().cloned())
                .collect(),
            inserted: 0,
        };
        for inst in std::mem::take(&mut function.body) {
            lowering.lower(inst)?;
        }
        let rewrites = lowering.body.len();
        debug!(
            "{}: lowered {} instructions ({} broadcasts inserted)",
            Self::NAME,
            rewrites - lowering.inserted,
            lowering.inserted
        );
        function.body = lowering.body;
        module.stage = Stage::Standard;
        Ok(PassResult {
            changed: true,
            iterations: 1,
            rewrites_applied: rewrites,
            erased_insts: 0,
        })
    }
}

struct Lowering {
    next_value_id: u32,
    body: Vec<Instruction>,
    parameters: Vec<(ValueId, TensorType)>,
    inserted: usize,
}

impl Lowering {
    fn lower(&mut self, inst: Instruction) -> Result<(), PassError> {
        let Operation::Graph(op) = &inst.op else {
            return Err(self.unsupported(&inst, "operation is not in the graph op family"));
        };
        let (op, operands) = match op {
            GraphOp::Constant(literal) => (StandardOp::Constant(literal.clone()), inst.operands.clone()),
            GraphOp::Concat { axis } => (StandardOp::Concat { axis: *axis }, inst.operands.clone()),
            GraphOp::Sum { axes } => (StandardOp::ReduceSum { axes: axes.clone() }, inst.operands.clone()),
            GraphOp::ScatterUpdate { axis } => (StandardOp::Scatter { axis: *axis }, inst.operands.clone()),
            GraphOp::Add { broadcast } => {
                let operands = match broadcast.kind {
                    AutoBroadcastType::None => inst.operands.clone(),
                    AutoBroadcastType::Numpy => inst
                        .operands
                        .iter()
                        .map(|operand| self.numpy_operand(&inst, *operand))
                        .collect::<Result<Vec<_>, _>>()?,
                    _ => {
                        return Err(self.unsupported(
                            &inst,
                            format!("add with {broadcast} broadcasting has no standard form"),
                        ))
                    }
                };
                (StandardOp::Add, operands)
            }
            GraphOp::Broadcast { axes } => {
                let Some(rank) = inst.output.shape.rank() else {
                    return Err(self.unsupported(&inst, "broadcast result rank is dynamic"));
                };
                let dims = axes.complement(rank);
                (
                    StandardOp::BroadcastInDim {
                        broadcast_dimensions: dims,
                    },
                    vec![inst.operands[0]],
                )
            }
            GraphOp::BroadcastLike { operand_dims } => match operand_dims {
                Some(dims) if inst.output.shape.is_static() => (
                    StandardOp::BroadcastInDim {
                        broadcast_dimensions: dims.clone(),
                    },
                    vec![inst.operands[0]],
                ),
                _ => {
                    return Err(self.unsupported(&inst, "broadcast dimensions are not resolved"));
                }
            },
            GraphOp::DynamicBroadcast { operand_dims, .. } => {
                let Some(dims) = operand_dims.clone() else {
                    return Err(self.unsupported(&inst, "broadcast dimensions are not resolved"));
                };
                if inst.output.shape.is_static() {
                    (
                        StandardOp::BroadcastInDim {
                            broadcast_dimensions: dims,
                        },
                        vec![inst.operands[0]],
                    )
                } else {
                    (
                        StandardOp::DynamicBroadcastInDim {
                            broadcast_dimensions: dims,
                        },
                        vec![inst.operands[0], inst.operands[1]],
                    )
                }
            }
        };
        self.body.push(Instruction {
            id: inst.id,
            op: Operation::Standard(op),
            operands,
            output: inst.output,
        });
        Ok(())
    }

    /// Operand of a numpy-broadcast add, expanded to the result shape when it differs.
    fn numpy_operand(&mut self, inst: &Instruction, operand: ValueId) -> Result<ValueId, PassError> {
        let Some(operand_ty) = self.value_type(operand).cloned() else {
            return Err(self.unsupported(inst, format!("operand {operand} has no definition")));
        };
        if operand_ty.shape == inst.output.shape {
            return Ok(operand);
        }
        let (Some(rank), true) = (operand_ty.shape.rank(), inst.output.shape.is_static()) else {
            return Err(self.unsupported(
                inst,
                "numpy broadcasting needs a static result shape and a ranked operand",
            ));
        };
        let out_rank = inst.output.shape.rank().unwrap_or(rank);
        let dims: AxisVector = axis_vector(out_rank - rank..out_rank);
        let id = ValueId(self.next_value_id);
        self.next_value_id += 1;
        self.inserted += 1;
        self.body.push(Instruction {
            id,
            op: Operation::Standard(StandardOp::BroadcastInDim {
                broadcast_dimensions: dims,
            }),
            operands: vec![operand],
            output: TensorType::new(operand_ty.element_type, inst.output.shape.clone()),
        });
        Ok(id)
    }

    fn value_type(&self, value: ValueId) -> Option<&TensorType> {
        self.parameters
            .iter()
            .find(|(id, _)| *id == value)
            .map(|(_, ty)| ty)
            .or_else(|| {
                self.body
                    .iter()
                    .find(|inst| inst.id == value)
                    .map(|inst| &inst.output)
            })
    }

    fn unsupported(&self, inst: &Instruction, reason: impl Into<String>) -> PassError {
        PassError::Unsupported {
            pass: StandardLoweringPass::NAME,
            instruction: format!("{} ({})", inst.id, inst.op.name()),
            reason: reason.into(),
        }
    }
}
