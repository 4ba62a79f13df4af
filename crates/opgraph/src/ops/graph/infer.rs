//! Context handed to [`Op::validate_and_infer`](crate::ops::kinds::Op::validate_and_infer).

use crate::ops::error::{ValidationError, ValidationRule};
use crate::ops::kinds::{Constant, OpKind};
use crate::ops::node::{Output, OutputDesc};
use crate::tensor::{ElementType, PartialShape, Shape};

use super::Graph;

/// Read-only view of a node's inputs plus the output slots it fills during inference.
pub struct InferCx<'g> {
    graph: &'g Graph,
    label: String,
    inputs: &'g [Output],
    outputs: Vec<OutputDesc>,
    shape_relevant: Vec<bool>,
}

impl<'g> InferCx<'g> {
    pub(super) fn new(graph: &'g Graph, label: String, inputs: &'g [Output]) -> Self {
        Self {
            graph,
            label,
            inputs,
            outputs: Vec::new(),
            shape_relevant: vec![false; inputs.len()],
        }
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    /// Display label of the node being validated, e.g. `Broadcast.v3 %4`.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn input_value(&self, index: usize) -> Output {
        self.inputs[index]
    }

    pub fn input_desc(&self, index: usize) -> &'g OutputDesc {
        self.graph.desc(self.inputs[index])
    }

    pub fn input_element_type(&self, index: usize) -> ElementType {
        self.input_desc(index).element_type
    }

    pub fn input_partial_shape(&self, index: usize) -> &'g PartialShape {
        &self.input_desc(index).shape
    }

    pub fn input_shape(&self, index: usize) -> Option<Shape> {
        self.input_partial_shape(index).to_shape()
    }

    /// Kind of the node producing input `index`.
    pub fn input_kind(&self, index: usize) -> &'g OpKind {
        self.graph.node(self.inputs[index].node).kind()
    }

    /// Constant producing input `index`, if any.
    pub fn input_constant(&self, index: usize) -> Option<&'g Constant> {
        self.input_kind(index).as_constant()
    }

    pub fn set_output_type(&mut self, index: usize, element_type: ElementType, shape: PartialShape) {
        if self.outputs.len() <= index {
            self.outputs.resize(index + 1, OutputDesc::dynamic());
        }
        self.outputs[index] = OutputDesc::new(element_type, shape);
    }

    pub fn set_input_is_relevant_to_shape(&mut self, index: usize) {
        self.shape_relevant[index] = true;
    }

    pub fn fail(&self, rule: ValidationRule, detail: String) -> ValidationError {
        ValidationError::new(self.label.clone(), rule, detail)
    }

    pub(super) fn finish(self) -> (Vec<OutputDesc>, Vec<bool>) {
        (self.outputs, self.shape_relevant)
    }
}
