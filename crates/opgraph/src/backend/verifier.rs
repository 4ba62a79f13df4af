//! Structural verification of dialect modules.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backend::dialect::{
    GraphOp, Instruction, Kernel, Module, Operation, Stage, StandardOp, TensorType, ValueId,
};
use crate::backend::index::FunctionIndices;
use crate::tensor::ElementType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub stage: Stage,
    pub instruction_index: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(stage: Stage, instruction_index: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            stage,
            instruction_index,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.instruction_index {
            Some(index) => write!(f, "[{}] instruction #{index}: {}", self.stage, self.message),
            None => write!(f, "[{}] {}", self.stage, self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    pub diagnostics: Vec<Diagnostic>,
}

impl VerificationReport {
    pub fn is_ok(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, diagnostic) in self.diagnostics.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

/// Checks SSA form, stage legality, operand arity, element types and broadcast dimension maps.
pub fn verify_module(module: &Module) -> VerificationReport {
    let mut report = VerificationReport::default();
    let stage = module.stage;
    let function = &module.function;

    let indices = match FunctionIndices::build(function) {
        Ok(indices) => indices,
        Err(err) => {
            report.diagnostics.push(Diagnostic::new(stage, None, err.to_string()));
            return report;
        }
    };

    if function.result_ids.len() != function.results.len() {
        report.diagnostics.push(Diagnostic::new(
            stage,
            None,
            format!(
                "function declares {} result types for {} results",
                function.results.len(),
                function.result_ids.len()
            ),
        ));
    }
    for (id, declared) in function.result_ids.iter().zip(function.results.iter()) {
        if indices.value_type(*id) != Some(declared) {
            report.diagnostics.push(Diagnostic::new(
                stage,
                None,
                format!("result {id} declared as {declared} but defined with another type"),
            ));
        }
    }

    for (position, instruction) in function.body.iter().enumerate() {
        let mut checker = InstructionChecker {
            stage,
            position,
            instruction,
            indices: &indices,
            report: &mut report,
        };
        checker.run();
    }

    if stage == Stage::Native {
        for (id, ty) in function.parameter_ids.iter().zip(function.parameters.iter()) {
            if !ty.is_static() {
                report.diagnostics.push(Diagnostic::new(
                    stage,
                    None,
                    format!("native parameter {id} has non-static type {ty}"),
                ));
            }
        }
    }
    report
}

struct InstructionChecker<'a> {
    stage: Stage,
    position: usize,
    instruction: &'a Instruction,
    indices: &'a FunctionIndices,
    report: &'a mut VerificationReport,
}

impl<'a> InstructionChecker<'a> {
    fn run(&mut self) {
        let instruction = self.instruction;
        let op = &instruction.op;
        if op.stage() != self.stage {
            self.error(format!(
                "operation {} belongs to the {} stage, module is at the {} stage",
                op.name(),
                op.stage(),
                self.stage
            ));
            return;
        }
        match op.arity() {
            Some(expected) if expected != instruction.operands.len() => {
                self.error(format!(
                    "{} expects {expected} operands, got {}",
                    op.name(),
                    instruction.operands.len()
                ));
                return;
            }
            None if instruction.operands.is_empty() => {
                self.error(format!("{} expects at least one operand", op.name()));
                return;
            }
            _ => {}
        }

        match op {
            Operation::Graph(op) => self.check_graph(op),
            Operation::Standard(op) => self.check_standard(op),
            Operation::Native(op) => {
                self.check_static();
                match &op.kernel {
                    Kernel::Constant(literal) => self.check_literal_type(literal.element_type),
                    Kernel::Scatter { .. } => self.check_scatter(),
                    _ => self.check_value_operands_match_output(),
                }
                match instruction.output.byte_len() {
                    Some(bytes) if bytes == op.output_bytes => {}
                    other => self.error(format!(
                        "output byte size {} does not match type size {other:?}",
                        op.output_bytes
                    )),
                }
            }
        }
    }

    fn check_graph(&mut self, op: &GraphOp) {
        let instruction = self.instruction;
        match op {
            GraphOp::Constant(literal) => self.check_literal_type(literal.element_type),
            GraphOp::Concat { .. } | GraphOp::Add { .. } | GraphOp::Sum { .. } => {
                self.check_value_operands_match_output()
            }
            GraphOp::Broadcast { axes } => {
                self.check_arg_type();
                if let (Some(max), Some(rank)) = (axes.max(), instruction.output.shape.rank()) {
                    if max >= rank {
                        self.error(format!("broadcast axis {max} out of range for rank {rank}"));
                    }
                }
            }
            GraphOp::BroadcastLike { operand_dims }
            | GraphOp::DynamicBroadcast { operand_dims, .. } => {
                self.check_arg_type();
                if let Some(dims) = operand_dims {
                    self.check_broadcast_dims(dims);
                }
            }
            GraphOp::ScatterUpdate { .. } => self.check_scatter(),
        }
    }

    fn check_standard(&mut self, op: &StandardOp) {
        let instruction = self.instruction;
        match op {
            StandardOp::Constant(literal) => self.check_literal_type(literal.element_type),
            StandardOp::Add => {
                self.check_value_operands_match_output();
                let output = instruction.output.shape.clone();
                for operand in instruction.operands.iter().copied() {
                    if let Some(ty) = self.operand_type(operand) {
                        if !ty.shape.compatible(&output) {
                            self.error(format!(
                                "std.add operand {operand} of shape {} differs from result {output}",
                                ty.shape
                            ));
                        }
                    }
                }
            }
            StandardOp::Concat { .. } | StandardOp::ReduceSum { .. } => {
                self.check_value_operands_match_output()
            }
            StandardOp::BroadcastInDim {
                broadcast_dimensions,
            }
            | StandardOp::DynamicBroadcastInDim {
                broadcast_dimensions,
            } => {
                self.check_arg_type();
                self.check_broadcast_dims(broadcast_dimensions);
            }
            StandardOp::Scatter { .. } => self.check_scatter(),
        }
    }

    /// Broadcast dimension maps are strictly ascending, one entry per operand axis, and in
    /// range of the result rank.
    fn check_broadcast_dims(&mut self, dims: &[usize]) {
        let instruction = self.instruction;
        if dims.windows(2).any(|pair| pair[0] >= pair[1]) {
            self.error(format!("broadcast dimensions {dims:?} are not strictly ascending"));
        }
        let arg_rank = self
            .operand_type(instruction.operands[0])
            .and_then(|ty| ty.shape.rank());
        if let Some(rank) = arg_rank {
            if rank != dims.len() {
                self.error(format!(
                    "broadcast dimensions {dims:?} do not cover operand rank {rank}"
                ));
            }
        }
        if let Some(rank) = instruction.output.shape.rank() {
            if let Some(axis) = dims.iter().find(|axis| **axis >= rank) {
                self.error(format!("broadcast dimension {axis} out of range for rank {rank}"));
            }
        }
    }

    fn check_scatter(&mut self) {
        let instruction = self.instruction;
        let operands = &instruction.operands;
        if let Some(indices) = self.operand_type(operands[1]) {
            if !matches!(
                indices.element_type,
                ElementType::I32 | ElementType::I64 | ElementType::Dynamic
            ) {
                self.error(format!("scatter indices have element type {}", indices.element_type));
            }
        }
        for operand in [operands[0], operands[2]] {
            self.check_element_type(operand);
        }
    }

    fn check_static(&mut self) {
        let instruction = self.instruction;
        if !instruction.output.is_static() {
            self.error(format!(
                "native instruction result {} is not static",
                instruction.output
            ));
        }
        for operand in instruction.operands.iter().copied() {
            if let Some(ty) = self.operand_type(operand) {
                if !ty.is_static() {
                    let message = format!("native operand {operand} has non-static type {ty}");
                    self.error(message);
                }
            }
        }
    }

    fn check_value_operands_match_output(&mut self) {
        let instruction = self.instruction;
        for operand in instruction.operands.iter().copied() {
            self.check_element_type(operand);
        }
    }

    fn check_arg_type(&mut self) {
        let instruction = self.instruction;
        let arg = instruction.operands[0];
        self.check_element_type(arg);
    }

    fn check_element_type(&mut self, operand: ValueId) {
        let instruction = self.instruction;
        let Some(ty) = self.operand_type(operand) else {
            return;
        };
        let output = instruction.output.element_type;
        if !ty.element_type.compatible(output) {
            let message = format!(
                "operand {operand} element type {} does not match result element type {output}",
                ty.element_type
            );
            self.error(message);
        }
    }

    fn check_literal_type(&mut self, element_type: ElementType) {
        let instruction = self.instruction;
        if element_type != instruction.output.element_type {
            self.error(format!(
                "literal element type {element_type} does not match result {}",
                instruction.output
            ));
        }
    }

    fn operand_type(&self, operand: ValueId) -> Option<&'a TensorType> {
        let indices: &'a FunctionIndices = self.indices;
        indices.value_type(operand)
    }

    fn error(&mut self, message: String) {
        self.report
            .diagnostics
            .push(Diagnostic::new(self.stage, Some(self.position), message));
    }
}
