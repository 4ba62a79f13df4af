//! Per-node bookkeeping stored inside the [`Graph`](super::Graph) arena.

use crate::ops::kinds::OpKind;
use crate::ops::node::{NodeTypeInfo, Output, OutputDesc};

/// Recorded node: kind with attributes, input edges, and the last inferred outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub(super) kind: OpKind,
    pub(super) inputs: Vec<Output>,
    pub(super) outputs: Vec<OutputDesc>,
    pub(super) shape_relevant: Vec<bool>,
}

impl NodeRecord {
    pub fn kind(&self) -> &OpKind {
        &self.kind
    }

    pub fn type_info(&self) -> NodeTypeInfo {
        self.kind.type_info()
    }

    pub fn inputs(&self) -> &[Output] {
        &self.inputs
    }

    pub fn input(&self, index: usize) -> Output {
        self.inputs[index]
    }

    pub fn outputs(&self) -> &[OutputDesc] {
        &self.outputs
    }

    pub fn output(&self, index: usize) -> &OutputDesc {
        &self.outputs[index]
    }

    /// Whether the value of input `index` (not just its shape) feeds output shape inference.
    pub fn is_input_relevant_to_shape(&self, index: usize) -> bool {
        self.shape_relevant.get(index).copied().unwrap_or(false)
    }
}

/// How freshly inferred outputs are combined with the recorded ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Reinfer {
    /// Inputs were rebound; inferred outputs replace the recorded ones.
    Replace,
    /// Inputs are unchanged; inferred outputs are merged and may only gain precision.
    Refine,
}
