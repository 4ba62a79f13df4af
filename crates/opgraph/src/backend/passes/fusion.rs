use log::trace;

use crate::backend::dialect::{Function, GraphOp, Module, Operation, Stage, TensorType, ValueId};
use crate::tensor::AxisSet;

use super::{expect_stage, ModulePass, PassError, PassResult};

/// Rewrite applied at a single body position of a graph-stage function.
pub trait BroadcastRewrite: Send + Sync {
    fn match_and_rewrite(&self, function: &mut Function, position: usize) -> bool;
}

/// Removes broadcasts whose result has exactly the operand's static type.
pub struct EliminateIdentityBroadcast;

impl BroadcastRewrite for EliminateIdentityBroadcast {
    fn match_and_rewrite(&self, function: &mut Function, position: usize) -> bool {
        let inst = &function.body[position];
        let resolved = match &inst.op {
            Operation::Graph(GraphOp::Broadcast { .. }) => true,
            Operation::Graph(GraphOp::BroadcastLike { operand_dims })
            | Operation::Graph(GraphOp::DynamicBroadcast { operand_dims, .. }) => {
                operand_dims.is_some()
            }
            _ => false,
        };
        if !resolved {
            return false;
        }
        let source = inst.operands[0];
        let Some(source_ty) = value_type(function, source) else {
            return false;
        };
        if !source_ty.is_static() || *source_ty != inst.output {
            return false;
        }

        let result = inst.id;
        function.replace_all_uses(result, source);
        function.body.remove(position);
        trace!("op-fusion: removed identity broadcast {result}");
        true
    }
}

/// Folds a static broadcast of a static broadcast into one broadcast of the innermost operand.
pub struct CollapseBroadcastChain;

impl BroadcastRewrite for CollapseBroadcastChain {
    fn match_and_rewrite(&self, function: &mut Function, position: usize) -> bool {
        let outer = &function.body[position];
        let Operation::Graph(GraphOp::Broadcast { axes: outer_axes }) = &outer.op else {
            return false;
        };
        let Some(outer_rank) = outer.output.shape.rank() else {
            return false;
        };
        let inner_value = outer.operands[0];
        let Some(inner) = function.body.iter().find(|inst| inst.id == inner_value) else {
            return false;
        };
        let Operation::Graph(GraphOp::Broadcast { axes: inner_axes }) = &inner.op else {
            return false;
        };
        let Some(inner_rank) = inner.output.shape.rank() else {
            return false;
        };

        let outer_dims = outer_axes.complement(outer_rank);
        if outer_dims.len() != inner_rank {
            return false;
        }
        let composed: Vec<usize> = inner_axes
            .complement(inner_rank)
            .iter()
            .map(|axis| outer_dims[*axis])
            .collect();
        let axes: AxisSet = (0..outer_rank).filter(|axis| !composed.contains(axis)).collect();
        let base = inner.operands[0];

        let outer = &mut function.body[position];
        trace!(
            "op-fusion: collapsed broadcast chain {inner_value} -> {} into axes {axes}",
            outer.id
        );
        outer.op = Operation::Graph(GraphOp::Broadcast { axes });
        outer.operands = vec![base];
        true
    }
}

fn value_type(function: &Function, value: ValueId) -> Option<&TensorType> {
    if let Some(index) = function.parameter_ids.iter().position(|id| *id == value) {
        return function.parameters.get(index);
    }
    function
        .body
        .iter()
        .find(|inst| inst.id == value)
        .map(|inst| &inst.output)
}

/// Broadcast simplification over graph-stage modules.
pub struct OpFusionPass {
    patterns: Vec<Box<dyn BroadcastRewrite>>,
}

impl OpFusionPass {
    const NAME: &'static str = "op-fusion";
}

impl Default for OpFusionPass {
    fn default() -> Self {
        Self {
            patterns: vec![
                Box::new(EliminateIdentityBroadcast),
                Box::new(CollapseBroadcastChain),
            ],
        }
    }
}

impl ModulePass for OpFusionPass {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run(&self, module: &mut Module) -> Result<PassResult, PassError> {
        expect_stage(Self::NAME, module, Stage::Graph)?;
        let function = &mut module.function;
        let before = function.body.len();
        let mut applied = 0usize;
        let mut position = 0usize;
        while position < function.body.len() {
            let rewritten = self
                .patterns
                .iter()
                .any(|pattern| pattern.match_and_rewrite(function, position));
            if rewritten {
                applied += 1;
            } else {
                position += 1;
            }
        }
        Ok(PassResult {
            changed: applied > 0,
            iterations: 1,
            rewrites_applied: applied,
            erased_insts: before - function.body.len(),
        })
    }
}
