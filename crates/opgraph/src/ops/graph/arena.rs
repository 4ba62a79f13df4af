//! Arena that owns every node of an op graph.
//!
//! Nodes are addressed by [`NodeId`] and never move once inserted, so handles stay valid for
//! the lifetime of the graph. A node is validated before it is inserted: construction either
//! yields a fully inferred node or a [`ValidationError`] and leaves the arena untouched.
//!
//! ## Re-inference
//!
//! Two flavours of re-inference exist:
//!
//! - **Rebinding** (`replace_input`, `set_parameter_shape`): the node's inputs change, so
//!   the freshly inferred outputs replace the recorded ones, and every transitive user is
//!   re-inferred in topological order. The whole rebind is transactional: if any node along
//!   the way fails validation, every touched record is restored.
//! - **Refinement** (`revalidate`): inputs are unchanged, so fresh results are merged into
//!   the recorded outputs. A contradiction is an error; static information is never dropped.
//!
//! Nodes unreachable from the graph results stay in the arena but are ignored by
//! [`Graph::topological_order`] and by lowering.

use std::fmt;

use log::{debug, trace};

use crate::ops::attrs::{AttributeVisitor, JsonAttributeVisitor};
use crate::ops::error::{ValidationError, ValidationRule};
use crate::ops::kinds::OpKind;
use crate::ops::node::{NodeId, Output, OutputDesc};
use crate::tensor::{ElementType, PartialShape};

use super::infer::InferCx;
use super::state::{NodeRecord, Reinfer};

type Inferred = (OpKind, Vec<OutputDesc>, Vec<bool>);

/// Owned op graph: node records plus the parameters and results that delimit it.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<NodeRecord>,
    parameters: Vec<NodeId>,
    results: Vec<Output>,
    version: u64,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Counter bumped on every structural change.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    /// Panics when `id` was not issued by this graph.
    pub fn node(&self, id: NodeId) -> &NodeRecord {
        self.nodes
            .get(id.index())
            .unwrap_or_else(|| panic!("unknown node handle {id}"))
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &NodeRecord)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, record)| (NodeId(index as u32), record))
    }

    pub fn try_desc(&self, value: Output) -> Option<&OutputDesc> {
        self.nodes
            .get(value.node.index())
            .and_then(|record| record.outputs.get(value.index))
    }

    /// Panics when `value` does not name an existing node output.
    pub fn desc(&self, value: Output) -> &OutputDesc {
        self.try_desc(value)
            .unwrap_or_else(|| panic!("unknown node output {value}"))
    }

    pub fn element_type(&self, value: Output) -> ElementType {
        self.desc(value).element_type
    }

    pub fn partial_shape(&self, value: Output) -> &PartialShape {
        &self.desc(value).shape
    }

    pub fn parameters(&self) -> &[NodeId] {
        &self.parameters
    }

    pub fn results(&self) -> &[Output] {
        &self.results
    }

    pub fn add_result(&mut self, value: Output) {
        assert!(
            self.try_desc(value).is_some(),
            "result {value} does not name a node output"
        );
        self.results.push(value);
        self.bump_version();
    }

    /// Display label used in diagnostics, e.g. `Broadcast.v3 %4`.
    pub fn label(&self, id: NodeId) -> String {
        node_label(self.node(id).kind(), id)
    }

    /// Validates `kind` against `inputs` and inserts it.
    pub fn add_node(&mut self, kind: OpKind, inputs: Vec<Output>) -> Result<NodeId, ValidationError> {
        let id = NodeId(self.nodes.len() as u32);
        let (kind, outputs, shape_relevant) = self.infer(id, kind, &inputs)?;
        trace!("added {}: {:?}", node_label(&kind, id), outputs);
        if matches!(kind, OpKind::Parameter(_)) {
            self.parameters.push(id);
        }
        self.nodes.push(NodeRecord {
            kind,
            inputs,
            outputs,
            shape_relevant,
        });
        self.bump_version();
        Ok(id)
    }

    /// Drops every node at or past `len`. Used to undo multi-node constructions.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.nodes.truncate(len);
        self.parameters.retain(|id| id.index() < len);
        self.results.retain(|value| value.node.index() < len);
        self.bump_version();
    }

    /// Inserts a copy of `id` with identical attributes wired to `new_inputs`.
    ///
    /// Panics when the input count differs from the original node's.
    pub fn clone_with_new_inputs(
        &mut self,
        id: NodeId,
        new_inputs: Vec<Output>,
    ) -> Result<NodeId, ValidationError> {
        let record = self.node(id);
        assert_eq!(
            new_inputs.len(),
            record.inputs.len(),
            "{}: clone expects {} inputs, got {}",
            self.label(id),
            record.inputs.len(),
            new_inputs.len()
        );
        let kind = record.kind.clone();
        self.add_node(kind, new_inputs)
    }

    /// Rebinds input `index` of `consumer` to `value` and re-infers everything downstream.
    ///
    /// Rejects rewrites that would make `consumer` reachable from itself. On failure the graph
    /// is left exactly as before the call.
    pub fn replace_input(
        &mut self,
        consumer: NodeId,
        index: usize,
        value: Output,
    ) -> Result<(), ValidationError> {
        let arity = self.node(consumer).inputs.len();
        assert!(
            index < arity,
            "{}: input index {index} out of range ({arity} inputs)",
            self.label(consumer)
        );
        if self.try_desc(value).is_none() {
            return Err(ValidationError::new(
                self.label(consumer),
                ValidationRule::UnknownInput,
                format!("replacement {value} does not exist"),
            ));
        }
        if value.node == consumer || self.depends_on(value.node, consumer) {
            return Err(ValidationError::new(
                self.label(consumer),
                ValidationRule::CycleDetected,
                format!("{value} already depends on {consumer}"),
            ));
        }
        trace!("{}: input {index} -> {value}", self.label(consumer));
        self.rebind(consumer, |record| record.inputs[index] = value)
    }

    /// Updates a parameter's declared type and shape and re-infers its users.
    ///
    /// Panics when `id` is not a parameter.
    pub fn set_parameter_shape(
        &mut self,
        id: NodeId,
        element_type: ElementType,
        shape: impl Into<PartialShape>,
    ) -> Result<(), ValidationError> {
        assert!(
            matches!(self.node(id).kind, OpKind::Parameter(_)),
            "{} is not a parameter",
            self.label(id)
        );
        let shape = shape.into();
        self.rebind(id, move |record| {
            if let OpKind::Parameter(parameter) = &mut record.kind {
                parameter.set_partial_shape(element_type, shape);
            }
        })
    }

    /// Re-runs inference on `id` without changing its inputs.
    ///
    /// Returns whether the recorded outputs gained precision. Fails if fresh inference
    /// contradicts what is recorded; the record is unchanged in that case.
    pub fn revalidate(&mut self, id: NodeId) -> Result<bool, ValidationError> {
        self.reinfer(id, Reinfer::Refine)
    }

    /// Every `(consumer, input index)` pair reading an output of `id`, in node order.
    pub fn users(&self, id: NodeId) -> Vec<(NodeId, usize)> {
        self.nodes()
            .flat_map(|(consumer, record)| {
                record
                    .inputs
                    .iter()
                    .enumerate()
                    .filter(move |(_, input)| input.node == id)
                    .map(move |(index, _)| (consumer, index))
            })
            .collect()
    }

    /// Nodes reachable from the graph results, producers before consumers.
    pub fn topological_order(&self) -> Vec<NodeId> {
        self.topological_order_from(&self.results)
    }

    pub fn topological_order_from(&self, roots: &[Output]) -> Vec<NodeId> {
        let mut visited = vec![false; self.nodes.len()];
        let mut order = Vec::new();
        for root in roots {
            if visited[root.node.index()] {
                continue;
            }
            visited[root.node.index()] = true;
            let mut stack = vec![(root.node, 0usize)];
            while let Some((node, next)) = stack.pop() {
                let inputs = &self.nodes[node.index()].inputs;
                if next < inputs.len() {
                    stack.push((node, next + 1));
                    let child = inputs[next].node;
                    if !visited[child.index()] {
                        visited[child.index()] = true;
                        stack.push((child, 0));
                    }
                } else {
                    order.push(node);
                }
            }
        }
        order
    }

    /// Returns `true` when `target` is a transitive producer of `node`.
    pub fn depends_on(&self, node: NodeId, target: NodeId) -> bool {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            for input in &self.node(current).inputs {
                if input.node == target {
                    return true;
                }
                if !visited[input.node.index()] {
                    visited[input.node.index()] = true;
                    stack.push(input.node);
                }
            }
        }
        false
    }

    /// Same kind, same attributes, same input edges.
    pub fn structurally_equal(&self, lhs: NodeId, rhs: NodeId) -> bool {
        let (lhs, rhs) = (self.node(lhs), self.node(rhs));
        lhs.kind == rhs.kind && lhs.inputs == rhs.inputs
    }

    pub fn visit_attributes(&self, id: NodeId, visitor: &mut dyn AttributeVisitor) {
        self.node(id).kind.as_op().visit_attributes(visitor);
    }

    pub fn attributes_json(&self, id: NodeId) -> Result<serde_json::Value, serde_json::Error> {
        let mut visitor = JsonAttributeVisitor::new();
        self.visit_attributes(id, &mut visitor);
        visitor.into_value()
    }

    fn bump_version(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    fn infer(&self, id: NodeId, mut kind: OpKind, inputs: &[Output]) -> Result<Inferred, ValidationError> {
        let label = node_label(&kind, id);
        if let Some(expected) = kind.arity() {
            if expected != inputs.len() {
                return Err(ValidationError::new(
                    label,
                    ValidationRule::InputCount,
                    format!("expected {expected} inputs, got {}", inputs.len()),
                ));
            }
        }
        for (index, input) in inputs.iter().enumerate() {
            if self.try_desc(*input).is_none() {
                return Err(ValidationError::new(
                    label,
                    ValidationRule::UnknownInput,
                    format!("input {index} references {input}, which does not exist"),
                ));
            }
        }
        let mut cx = InferCx::new(self, label, inputs);
        kind.as_op_mut().validate_and_infer(&mut cx)?;
        let (outputs, shape_relevant) = cx.finish();
        Ok((kind, outputs, shape_relevant))
    }

    fn reinfer(&mut self, id: NodeId, mode: Reinfer) -> Result<bool, ValidationError> {
        let record = self.node(id);
        let kind = record.kind.clone();
        let inputs = record.inputs.clone();
        let (kind, outputs, shape_relevant) = self.infer(id, kind, &inputs)?;
        let outputs = match mode {
            Reinfer::Replace => outputs,
            Reinfer::Refine => merge_outputs(&self.label(id), &self.node(id).outputs, outputs)?,
        };
        let record = &mut self.nodes[id.index()];
        let changed = record.outputs != outputs || record.kind != kind;
        record.kind = kind;
        record.outputs = outputs;
        record.shape_relevant = shape_relevant;
        Ok(changed)
    }

    /// Applies `mutate` to `start`, then re-infers `start` and its transitive users.
    fn rebind(
        &mut self,
        start: NodeId,
        mutate: impl FnOnce(&mut NodeRecord),
    ) -> Result<(), ValidationError> {
        let order = self.downstream_order(start);
        let snapshot: Vec<NodeRecord> = order
            .iter()
            .map(|id| self.nodes[id.index()].clone())
            .collect();
        mutate(&mut self.nodes[start.index()]);
        for id in &order {
            if let Err(err) = self.reinfer(*id, Reinfer::Replace) {
                debug!("rolling back rebind of {}: {err}", self.label(start));
                for (id, record) in order.iter().zip(snapshot) {
                    self.nodes[id.index()] = record;
                }
                return Err(err);
            }
        }
        self.bump_version();
        Ok(())
    }

    /// `start` followed by its transitive users in topological order.
    fn downstream_order(&self, start: NodeId) -> Vec<NodeId> {
        let mut users: Vec<Vec<NodeId>> = vec![Vec::new(); self.nodes.len()];
        for (consumer, record) in self.nodes() {
            for input in &record.inputs {
                users[input.node.index()].push(consumer);
            }
        }

        let mut visited = vec![false; self.nodes.len()];
        let mut postorder = Vec::new();
        visited[start.index()] = true;
        let mut stack = vec![(start, 0usize)];
        while let Some((node, next)) = stack.pop() {
            let children = &users[node.index()];
            if next < children.len() {
                stack.push((node, next + 1));
                let child = children[next];
                if !visited[child.index()] {
                    visited[child.index()] = true;
                    stack.push((child, 0));
                }
            } else {
                postorder.push(node);
            }
        }
        postorder.reverse();
        postorder
    }
}

fn node_label(kind: &OpKind, id: NodeId) -> String {
    format!("{} {}", kind.type_info(), id)
}

fn merge_outputs(
    label: &str,
    recorded: &[OutputDesc],
    inferred: Vec<OutputDesc>,
) -> Result<Vec<OutputDesc>, ValidationError> {
    if recorded.len() != inferred.len() {
        return Err(ValidationError::new(
            label,
            ValidationRule::OutputConflict,
            format!(
                "recorded {} outputs, inferred {}",
                recorded.len(),
                inferred.len()
            ),
        ));
    }
    recorded
        .iter()
        .zip(inferred.iter())
        .enumerate()
        .map(|(index, (old, new))| {
            old.merge(new).ok_or_else(|| {
                ValidationError::new(
                    label,
                    ValidationRule::OutputConflict,
                    format!("output {index}: recorded {old} contradicts inferred {new}"),
                )
            })
        })
        .collect()
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, record) in self.nodes() {
            let inputs = record
                .inputs
                .iter()
                .map(Output::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            let outputs = record
                .outputs
                .iter()
                .map(OutputDesc::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "{id} = {}({inputs}) -> {outputs}", record.type_info())?;
        }
        let results = self
            .results
            .iter()
            .map(Output::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "return {results}")
    }
}
