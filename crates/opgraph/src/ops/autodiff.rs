//! Reverse-mode adjoint construction over the op graph.
//!
//! Deltas are propagated from a root output towards the leaves in reverse topological order,
//! so every contribution to a node's output delta is accumulated before that node's own rule
//! runs. Contributions to the same value are summed with an elementwise `Add`.

use std::collections::HashMap;

use log::trace;

use crate::ops::autobroadcast::AutoBroadcastSpec;
use crate::ops::error::{OpError, UnsupportedError, ValidationError, ValidationRule};
use crate::ops::graph::Graph;
use crate::ops::kinds::arith::add;
use crate::ops::node::{NodeId, Output};
use crate::tensor::PartialShape;

/// Accumulated delta per differentiated value.
#[derive(Debug, Clone, Default)]
pub struct Adjoints {
    deltas: HashMap<Output, Output>,
}

impl Adjoints {
    /// Builds adjoint nodes for everything `root` depends on, seeded with `seed` as the delta
    /// of `root`.
    ///
    /// Leaves (nodes without inputs) terminate propagation. Any other node on the path without
    /// an adjoint rule fails with [`OpError::Unsupported`]. On failure, nodes created for
    /// partial deltas are removed again.
    pub fn backprop(graph: &mut Graph, root: Output, seed: Output) -> Result<Self, OpError> {
        let (root_desc, seed_desc) = (graph.desc(root), graph.desc(seed));
        if !root_desc.shape.compatible(&seed_desc.shape)
            || !root_desc.element_type.compatible(seed_desc.element_type)
        {
            return Err(ValidationError::new(
                graph.label(root.node),
                ValidationRule::IncompatibleShapes,
                format!("seed {seed_desc} does not match output {root_desc}"),
            )
            .into());
        }

        let mut adjoints = Adjoints::default();
        adjoints.deltas.insert(root, seed);

        let mark = graph.len();
        if let Err(err) = adjoints.propagate(graph, root) {
            if graph.len() > mark {
                graph.truncate(mark);
            }
            return Err(err);
        }
        Ok(adjoints)
    }

    fn propagate(&mut self, graph: &mut Graph, root: Output) -> Result<(), OpError> {
        let order = graph.topological_order_from(&[root]);
        for node in order.into_iter().rev() {
            let record = graph.node(node);
            if record.inputs().is_empty() {
                continue;
            }
            let pending: Vec<Option<Output>> = (0..record.outputs().len())
                .map(|index| self.deltas.get(&node.output(index)).copied())
                .collect();
            if pending.iter().all(Option::is_none) {
                continue;
            }

            let kind = record.kind().clone();
            let mut cx = AdjointCx {
                graph: &mut *graph,
                adjoints: &mut *self,
                node,
            };
            let Some(deltas) = pending.into_iter().collect::<Option<Vec<_>>>() else {
                return Err(cx
                    .unsupported("differentiation", "deltas missing for some outputs")
                    .into());
            };
            trace!("adjoint rule for {}", cx.label());
            kind.as_op().generate_adjoints(&mut cx, &deltas)?;
        }
        Ok(())
    }

    /// Accumulated delta for `value`, if anything flowed into it.
    pub fn delta(&self, value: Output) -> Option<Output> {
        self.deltas.get(&value).copied()
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}

/// Context handed to [`Op::generate_adjoints`](crate::ops::kinds::Op::generate_adjoints).
pub struct AdjointCx<'a> {
    graph: &'a mut Graph,
    adjoints: &'a mut Adjoints,
    node: NodeId,
}

impl<'a> AdjointCx<'a> {
    pub fn graph(&self) -> &Graph {
        self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        self.graph
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn label(&self) -> String {
        self.graph.label(self.node)
    }

    pub fn input_value(&self, index: usize) -> Output {
        self.graph.node(self.node).input(index)
    }

    pub fn input_partial_shape(&self, index: usize) -> PartialShape {
        self.graph.partial_shape(self.input_value(index)).clone()
    }

    pub fn output_partial_shape(&self, index: usize) -> PartialShape {
        self.graph.partial_shape(self.node.output(index)).clone()
    }

    /// Adds `delta` to the running delta of `value`.
    pub fn add_delta(&mut self, value: Output, delta: Output) -> Result<(), OpError> {
        let (value_shape, delta_shape) = (
            self.graph.partial_shape(value),
            self.graph.partial_shape(delta),
        );
        if !value_shape.compatible(delta_shape) {
            return Err(ValidationError::new(
                self.label(),
                ValidationRule::IncompatibleShapes,
                format!("delta shape {delta_shape} does not match {value} of shape {value_shape}"),
            )
            .into());
        }
        let accumulated = match self.adjoints.deltas.get(&value).copied() {
            Some(existing) => add(self.graph, existing, delta, AutoBroadcastSpec::NONE)?,
            None => delta,
        };
        self.adjoints.deltas.insert(value, accumulated);
        Ok(())
    }

    pub fn unsupported(&self, capability: &'static str, reason: impl Into<String>) -> UnsupportedError {
        UnsupportedError::new(self.label(), capability, reason)
    }
}
