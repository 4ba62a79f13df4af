//! Broadcast family: legacy static broadcast (v0), shape-following `BroadcastLike`, and the
//! dynamic-target broadcast shared by revisions 1 and 3.
//!
//! Revisions 1 and 3 differ only in which autobroadcast modes they accept (3 adds
//! `Bidirectional`), so one [`Broadcast`] struct carries a [`BroadcastVersion`].
//!
//! ## Target shape resolution
//!
//! The target shape of v1/v3 is an input value, not an attribute. Inference resolves as much
//! of it as the producer allows:
//!
//! - a `Constant` producer yields the full static shape,
//! - a `Concat` of single-element pieces yields one dimension per piece, static where the
//!   piece is a constant,
//! - anything else leaves the output rank unknown.

use log::trace;

use crate::ops::attrs::{AttrValue, AttributeVisitor};
use crate::ops::autobroadcast::{pad_left, AutoBroadcastSpec, AutoBroadcastType};
use crate::ops::autodiff::AdjointCx;
use crate::ops::error::{node_check, OpError, UnsupportedError, ValidationError, ValidationRule};
use crate::ops::graph::{Graph, InferCx};
use crate::ops::node::{NodeId, NodeTypeInfo, Output};
use crate::tensor::{format_axes, AxisSet, AxisVector, Dimension, ElementType, PartialShape, Shape};

use super::arith::sum;
use super::constant::{constant, ConstantValues};
use super::{Op, OpKind};

/// Statically resolved broadcast axes of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastAxes {
    /// Output axes along which the arg is replicated.
    pub axes: AxisSet,
    /// Output axis each arg axis is placed on, one entry per arg axis.
    pub operand_dims: AxisVector,
}

impl BroadcastAxes {
    /// Arg axes of extent 1 that are stretched along a broadcast axis.
    pub fn expanded_arg_axes(&self) -> AxisSet {
        self.operand_dims
            .iter()
            .enumerate()
            .filter(|(_, dim)| self.axes.contains(**dim))
            .map(|(axis, _)| axis)
            .collect()
    }
}

/// Sums `delta` over the broadcast axes and accumulates the result into `arg`.
///
/// Arg axes of extent 1 that were stretched are restored with a v0 broadcast so the
/// contribution has exactly the arg's shape.
pub(crate) fn accumulate_broadcast_delta(
    cx: &mut AdjointCx<'_>,
    arg: Output,
    delta: Output,
    resolved: &BroadcastAxes,
) -> Result<(), OpError> {
    let reduced = if resolved.axes.is_empty() {
        delta
    } else {
        sum(cx.graph_mut(), delta, resolved.axes.clone())?
    };
    let expanded = resolved.expanded_arg_axes();
    let contribution = if expanded.is_empty() {
        reduced
    } else {
        let Some(arg_shape) = cx.graph().partial_shape(arg).to_shape() else {
            return Err(cx
                .unsupported("differentiation", "stretched arg axes with dynamic arg shape")
                .into());
        };
        broadcast_v0(cx.graph_mut(), reduced, arg_shape, expanded)?
    };
    cx.add_delta(arg, contribution)
}

fn check_axes_in_range(
    cx: &mut InferCx<'_>,
    shape: &Shape,
    axes: &AxisSet,
) -> Result<(), ValidationError> {
    for axis in axes.iter() {
        node_check!(
            cx,
            axis < shape.rank(),
            ValidationRule::AxisOutOfRange,
            "broadcast axis index ({axis}) exceeds specified output shape rank \
             (broadcast axes: {axes}, output shape: {shape})"
        );
    }
    Ok(())
}

/// Checks the arg against `shape` with `axes` removed and sets the output type.
fn validate_removed_axes(
    cx: &mut InferCx<'_>,
    shape: &Shape,
    axes: &AxisSet,
) -> Result<(), ValidationError> {
    check_axes_in_range(cx, shape, axes)?;
    let required = PartialShape::from_static(
        &shape
            .dims()
            .iter()
            .enumerate()
            .filter(|(axis, _)| !axes.contains(*axis))
            .map(|(_, dim)| *dim)
            .collect::<Vec<_>>(),
    );
    let arg = cx.input_partial_shape(0);
    node_check!(
        cx,
        arg.compatible(&required),
        ValidationRule::IncompatibleShapes,
        "broadcast argument shape, specified output shape, and axes are incompatible \
         (argument shape: {arg}, output shape: {shape}, broadcast axes: {axes})"
    );
    let element_type = cx.input_element_type(0);
    cx.set_output_type(0, element_type, shape.into());
    Ok(())
}

/// Legacy broadcast with the output shape and replicated axes as attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastV0 {
    shape: Shape,
    broadcast_axes: AxisSet,
}

impl BroadcastV0 {
    pub fn new(shape: Shape, broadcast_axes: AxisSet) -> Self {
        Self {
            shape,
            broadcast_axes,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn broadcast_axes(&self) -> &AxisSet {
        &self.broadcast_axes
    }

    pub fn resolved(&self) -> BroadcastAxes {
        BroadcastAxes {
            axes: self.broadcast_axes.clone(),
            operand_dims: self.broadcast_axes.complement(self.shape.rank()),
        }
    }
}

impl Op for BroadcastV0 {
    fn type_info(&self) -> NodeTypeInfo {
        NodeTypeInfo::new("Broadcast", 0)
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }

    fn validate_and_infer(&mut self, cx: &mut InferCx<'_>) -> Result<(), ValidationError> {
        validate_removed_axes(cx, &self.shape, &self.broadcast_axes)
    }

    fn visit_attributes(&self, visitor: &mut dyn AttributeVisitor) {
        visitor.on_attribute("shape", AttrValue::Shape(&self.shape));
        visitor.on_attribute("broadcast_axes", AttrValue::AxisSet(&self.broadcast_axes));
    }

    fn supports_adjoints(&self) -> bool {
        true
    }

    fn generate_adjoints(&self, cx: &mut AdjointCx<'_>, deltas: &[Output]) -> Result<(), OpError> {
        let arg = cx.input_value(0);
        accumulate_broadcast_delta(cx, arg, deltas[0], &self.resolved())
    }
}

/// Shape and axes a [`BroadcastLike`] resolved to on its last inference.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLike {
    pub shape: Shape,
    pub broadcast: BroadcastAxes,
}

/// Broadcast whose output shape follows a second "like" input.
///
/// With no initial axes, the broadcast axes are recomputed from the arg and like shapes on
/// every inference.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastLike {
    initial_broadcast_axes: AxisSet,
    resolved: Option<ResolvedLike>,
}

impl BroadcastLike {
    pub fn new(initial_broadcast_axes: AxisSet) -> Self {
        Self {
            initial_broadcast_axes,
            resolved: None,
        }
    }

    pub fn initial_broadcast_axes(&self) -> &AxisSet {
        &self.initial_broadcast_axes
    }

    /// `None` until both the like shape and, when axes are inferred, the arg shape are static.
    pub fn resolved(&self) -> Option<&ResolvedLike> {
        self.resolved.as_ref()
    }

    /// Left-to-right axis inference: target positions past the arg rank, and positions where
    /// the arg has extent 1 but the target does not.
    pub fn infer_axes(arg: &Shape, target: &Shape) -> AxisSet {
        (0..target.rank())
            .filter(|axis| match arg.dims().get(*axis) {
                Some(extent) => *extent == 1 && target[*axis] > 1,
                None => true,
            })
            .collect()
    }
}

impl Op for BroadcastLike {
    fn type_info(&self) -> NodeTypeInfo {
        NodeTypeInfo::new("BroadcastLike", 0)
    }

    fn arity(&self) -> Option<usize> {
        Some(2)
    }

    fn validate_and_infer(&mut self, cx: &mut InferCx<'_>) -> Result<(), ValidationError> {
        self.resolved = None;
        let element_type = cx.input_element_type(0);
        let like = cx.input_partial_shape(1);
        let Some(target) = like.to_shape() else {
            cx.set_output_type(0, element_type, like.clone());
            return Ok(());
        };

        let axes = if self.initial_broadcast_axes.is_empty() {
            match cx.input_shape(0) {
                Some(arg) => Self::infer_axes(&arg, &target),
                None => {
                    cx.set_output_type(0, element_type, target.into());
                    return Ok(());
                }
            }
        } else {
            self.initial_broadcast_axes.clone()
        };

        check_axes_in_range(cx, &target, &axes)?;

        // Either the arg lacks the broadcast axes entirely (v0 layout), or it keeps them with
        // extent 1.
        let arg = cx.input_partial_shape(0);
        let operand_dims = match arg.dims() {
            Some(arg_dims) if arg_dims.len() + axes.len() != target.rank() => {
                node_check!(
                    cx,
                    arg_dims.len() <= target.rank(),
                    ValidationRule::TargetRankTooSmall,
                    "like shape {target} has smaller rank than arg shape {arg}"
                );
                for (axis, dim) in arg_dims.iter().enumerate() {
                    let expected = if axes.contains(axis) { 1 } else { target[axis] };
                    node_check!(
                        cx,
                        dim.compatible(Dimension::Static(expected)),
                        ValidationRule::IncompatibleShapes,
                        "arg shape {arg} cannot be broadcast like {target} along axes {axes}"
                    );
                }
                cx.set_output_type(0, element_type, (&target).into());
                (0..arg_dims.len()).collect()
            }
            _ => {
                validate_removed_axes(cx, &target, &axes)?;
                axes.complement(target.rank())
            }
        };

        trace!("{}: broadcast axes {axes}", cx.label());
        self.resolved = Some(ResolvedLike {
            shape: target,
            broadcast: BroadcastAxes { axes, operand_dims },
        });
        Ok(())
    }

    fn visit_attributes(&self, visitor: &mut dyn AttributeVisitor) {
        if let Some(resolved) = &self.resolved {
            visitor.on_attribute("shape", AttrValue::Shape(&resolved.shape));
            visitor.on_attribute("broadcast_axes", AttrValue::AxisSet(&resolved.broadcast.axes));
        }
        visitor.on_attribute(
            "initial_broadcast_axes",
            AttrValue::AxisSet(&self.initial_broadcast_axes),
        );
    }

    fn supports_adjoints(&self) -> bool {
        true
    }

    fn generate_adjoints(&self, cx: &mut AdjointCx<'_>, deltas: &[Output]) -> Result<(), OpError> {
        let Some(resolved) = &self.resolved else {
            return Err(cx
                .unsupported("differentiation", "broadcast axes are not statically known")
                .into());
        };
        let arg = cx.input_value(0);
        accumulate_broadcast_delta(cx, arg, deltas[0], &resolved.broadcast)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BroadcastVersion {
    V1,
    V3,
}

impl BroadcastVersion {
    pub fn number(self) -> u64 {
        match self {
            BroadcastVersion::V1 => 1,
            BroadcastVersion::V3 => 3,
        }
    }
}

/// Broadcast to a target shape supplied as an input value.
///
/// Inputs: `arg`, `target_shape`, `axes_mapping`. In automatic modes the third input is a
/// placeholder `u8` zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast {
    version: BroadcastVersion,
    spec: AutoBroadcastSpec,
}

impl Broadcast {
    pub fn new(version: BroadcastVersion, spec: AutoBroadcastSpec) -> Self {
        Self { version, spec }
    }

    pub fn version(&self) -> BroadcastVersion {
        self.version
    }

    pub fn spec(&self) -> AutoBroadcastSpec {
        self.spec
    }

    /// Resolves the broadcast axes of `node` from the current graph state.
    ///
    /// Explicit mode needs a static target-shape input and a constant mapping. Automatic
    /// modes need static arg and output shapes. Returns `None` otherwise.
    pub fn broadcast_axes(&self, graph: &Graph, node: NodeId) -> Option<BroadcastAxes> {
        let record = graph.node(node);
        if self.spec.is_explicit() {
            let target_rank = graph.partial_shape(record.input(1)).to_shape()?.num_elements();
            let mapping = graph
                .node(record.input(2).node)
                .kind()
                .as_constant()?
                .axis_vector_value()?;
            if mapping.iter().any(|axis| *axis >= target_rank) {
                return None;
            }
            let axes = (0..target_rank)
                .filter(|axis| !mapping.contains(axis))
                .collect();
            return Some(BroadcastAxes {
                axes,
                operand_dims: mapping,
            });
        }

        let arg = graph.partial_shape(record.input(0)).to_shape()?;
        let output = record.output(0).shape.to_shape()?;
        let (out_rank, arg_rank) = (output.rank(), arg.rank());
        let start = usize::try_from(self.spec.start_axis(out_rank, arg_rank)).ok()?;
        if start + arg_rank > out_rank {
            return None;
        }
        let axes = (0..out_rank)
            .filter(|axis| {
                *axis < start || *axis >= start + arg_rank || output[*axis] != arg[*axis - start]
            })
            .collect();
        Some(BroadcastAxes {
            axes,
            operand_dims: (start..start + arg_rank).collect(),
        })
    }

    fn validate_explicit_mapping(
        &self,
        cx: &mut InferCx<'_>,
        target: Option<&Shape>,
    ) -> Result<(), ValidationError> {
        let mapping = constant_axes(cx, 2)?;
        if let Some(mapping) = &mapping {
            node_check!(
                cx,
                mapping.windows(2).all(|pair| pair[0] < pair[1]),
                ValidationRule::AxesMappingNotSorted,
                "broadcast doesn't permit transposes. axes_mapping {} not in sorted order",
                format_axes(mapping)
            );
        }

        let (arg, target_input, axes_input) = (
            cx.input_partial_shape(0),
            cx.input_partial_shape(1),
            cx.input_partial_shape(2),
        );
        if let (Some(arg_rank), Some(axes_shape)) = (arg.rank(), axes_input.to_shape()) {
            if target_input.is_static() {
                let count = axes_shape.num_elements();
                node_check!(
                    cx,
                    count == arg_rank,
                    ValidationRule::AxesMappingSize,
                    "broadcast axes_mapping shape {axes_shape} doesn't match rank of input tensor {arg_rank}"
                );
            }
        }

        let (Some(target), Some(mapping)) = (target, mapping) else {
            return Ok(());
        };
        for (index, axis) in mapping.iter().copied().enumerate() {
            node_check!(
                cx,
                axis < target.rank(),
                ValidationRule::AxesMappingOutOfRange,
                "broadcast axes_mapping[{index}]: {axis} exceeds target rank {}",
                target.rank()
            );
            if let Some(dim) = arg.get(index) {
                node_check!(
                    cx,
                    dim.compatible(Dimension::Static(target[axis])),
                    ValidationRule::AxesMappingDimMismatch,
                    "broadcast target[axes_mapping[{index}]] expected {}. got {dim}",
                    target[axis]
                );
            }
        }
        Ok(())
    }

    fn align(&self, cx: &mut InferCx<'_>, candidate: PartialShape) -> Result<PartialShape, ValidationError> {
        let arg = cx.input_partial_shape(0);
        let (Some(arg_dims), Some(target_dims)) = (arg.dims(), candidate.dims()) else {
            return Ok(candidate);
        };
        let (arg_dims, target_dims) = if self.spec.kind == AutoBroadcastType::Bidirectional {
            let rank = arg_dims.len().max(target_dims.len());
            (pad_left(arg_dims, rank), pad_left(target_dims, rank))
        } else {
            (arg_dims.to_vec(), target_dims.to_vec())
        };

        let start = self.spec.start_axis(target_dims.len(), arg_dims.len());
        node_check!(
            cx,
            start >= 0,
            ValidationRule::TargetRankTooSmall,
            "broadcast target_shape has smaller rank {} than arg shape {}",
            target_dims.len(),
            arg_dims.len()
        );
        let start = start as usize;
        node_check!(
            cx,
            start + arg_dims.len() <= target_dims.len(),
            ValidationRule::TargetRankTooSmall,
            "broadcast start axis {start} places arg shape {arg} past target rank {}",
            target_dims.len()
        );

        let mut output = target_dims.clone();
        for (offset, arg_dim) in arg_dims.iter().enumerate() {
            let axis = start + offset;
            let merged = arg_dim.broadcast_merge(target_dims[axis]);
            node_check!(
                cx,
                merged.is_some(),
                ValidationRule::BroadcastIncompatible,
                "broadcast incorrect target shape. expecting either 1 or {arg_dim} at axis {axis}. got {}",
                target_dims[axis]
            );
            output[axis] = merged.unwrap_or(target_dims[axis]);
        }
        Ok(PartialShape::new(output))
    }
}

impl Op for Broadcast {
    fn type_info(&self) -> NodeTypeInfo {
        NodeTypeInfo::new("Broadcast", self.version.number())
    }

    fn arity(&self) -> Option<usize> {
        Some(3)
    }

    fn validate_and_infer(&mut self, cx: &mut InferCx<'_>) -> Result<(), ValidationError> {
        let shape_type = cx.input_element_type(1);
        node_check!(
            cx,
            shape_type.is_integral_number() || shape_type.is_dynamic(),
            ValidationRule::IntegralTypeRequired,
            "broadcast shape must be an integral number, but is: {shape_type}"
        );
        let shape_input = cx.input_partial_shape(1);
        node_check!(
            cx,
            shape_input.rank_compatible(1),
            ValidationRule::RankMismatch,
            "broadcast shape rank must be 1, but has {shape_input}"
        );
        if self.spec.is_explicit() {
            let axes_type = cx.input_element_type(2);
            node_check!(
                cx,
                axes_type.is_integral_number() || axes_type.is_dynamic(),
                ValidationRule::IntegralTypeRequired,
                "broadcast axes must be integral numbers, but are: {axes_type}"
            );
            let axes_input = cx.input_partial_shape(2);
            node_check!(
                cx,
                axes_input.rank_compatible(1),
                ValidationRule::RankMismatch,
                "broadcast axes rank must be 1, but has {axes_input}"
            );
        }

        let target = constant_shape(cx, 1)?;
        let mut output = match &target {
            Some(shape) => shape.into(),
            None => concat_target_shape(cx)?,
        };
        if self.spec.is_explicit() {
            self.validate_explicit_mapping(cx, target.as_ref())?;
        } else {
            output = self.align(cx, output)?;
        }

        for index in 0..3 {
            cx.set_input_is_relevant_to_shape(index);
        }
        let element_type = cx.input_element_type(0);
        cx.set_output_type(0, element_type, output);
        Ok(())
    }

    fn visit_attributes(&self, visitor: &mut dyn AttributeVisitor) {
        visitor.on_attribute("broadcast_spec", AttrValue::BroadcastSpec(&self.spec));
    }

    fn supports_adjoints(&self) -> bool {
        true
    }

    fn generate_adjoints(&self, cx: &mut AdjointCx<'_>, deltas: &[Output]) -> Result<(), OpError> {
        let shapes_static =
            cx.input_partial_shape(0).is_static() && cx.output_partial_shape(0).is_static();
        let resolved = shapes_static
            .then(|| self.broadcast_axes(cx.graph(), cx.node()))
            .flatten();
        let Some(resolved) = resolved else {
            return Err(cx
                .unsupported("differentiation", "autodiff not supported on dynamic op variants")
                .into());
        };
        let arg = cx.input_value(0);
        accumulate_broadcast_delta(cx, arg, deltas[0], &resolved)
    }
}

/// Non-negative integer values of constant input `index`. Negative entries are an error.
fn constant_axes(cx: &InferCx<'_>, index: usize) -> Result<Option<AxisVector>, ValidationError> {
    let Some(constant) = cx.input_constant(index) else {
        return Ok(None);
    };
    let Some(values) = constant.int_values() else {
        return Ok(None);
    };
    node_check!(
        cx,
        values.iter().all(|value| *value >= 0),
        ValidationRule::NegativeShapeValue,
        "input {index} holds negative values {values:?}"
    );
    Ok(constant.axis_vector_value())
}

fn constant_shape(cx: &InferCx<'_>, index: usize) -> Result<Option<Shape>, ValidationError> {
    Ok(constant_axes(cx, index)?.map(|dims| Shape::new(dims.into_vec())))
}

/// Per-dimension target shape when the target is a `Concat` of single-element pieces.
fn concat_target_shape(cx: &InferCx<'_>) -> Result<PartialShape, ValidationError> {
    if !matches!(cx.input_kind(1), OpKind::Concat(_)) {
        return Ok(PartialShape::dynamic());
    }
    let graph = cx.graph();
    let pieces = graph.node(cx.input_value(1).node).inputs();
    let Some(length) = cx.input_partial_shape(1).to_shape().map(|shape| shape.num_elements()) else {
        return Ok(PartialShape::dynamic());
    };
    if pieces.len() != length {
        return Ok(PartialShape::dynamic());
    }
    let mut dims = Vec::with_capacity(length);
    for piece in pieces {
        let value = graph
            .node(piece.node)
            .kind()
            .as_constant()
            .filter(|constant| constant.shape().num_elements() == 1)
            .and_then(|constant| constant.int_values())
            .and_then(|values| values.first().copied());
        let dim = match value {
            Some(extent) => {
                node_check!(
                    cx,
                    extent >= 0,
                    ValidationRule::NegativeShapeValue,
                    "target shape piece {piece} holds negative extent {extent}"
                );
                Dimension::Static(extent as usize)
            }
            None => Dimension::Dynamic,
        };
        dims.push(dim);
    }
    Ok(PartialShape::new(dims))
}

pub fn broadcast_v0(
    graph: &mut Graph,
    arg: Output,
    shape: impl Into<Shape>,
    broadcast_axes: AxisSet,
) -> Result<Output, ValidationError> {
    let kind = OpKind::BroadcastV0(BroadcastV0::new(shape.into(), broadcast_axes));
    Ok(graph.add_node(kind, vec![arg])?.into())
}

pub fn broadcast_like(
    graph: &mut Graph,
    arg: Output,
    like_arg: Output,
    initial_broadcast_axes: AxisSet,
) -> Result<Output, ValidationError> {
    let kind = OpKind::BroadcastLike(BroadcastLike::new(initial_broadcast_axes));
    Ok(graph.add_node(kind, vec![arg, like_arg])?.into())
}

fn construction_label(version: BroadcastVersion) -> String {
    format!("Broadcast.v{} (construction)", version.number())
}

fn broadcast_explicit(
    graph: &mut Graph,
    version: BroadcastVersion,
    arg: Output,
    target_shape: Output,
    axes_mapping: Output,
    spec: AutoBroadcastSpec,
) -> Result<Output, OpError> {
    if !spec.is_explicit() {
        return Err(ValidationError::new(
            construction_label(version),
            ValidationRule::BroadcastModeConstructor,
            "axes_mapping input should not be provided for mode other than explicit",
        )
        .into());
    }
    let kind = OpKind::Broadcast(Broadcast::new(version, spec));
    Ok(graph
        .add_node(kind, vec![arg, target_shape, axes_mapping])?
        .into())
}

fn broadcast_auto(
    graph: &mut Graph,
    version: BroadcastVersion,
    arg: Output,
    target_shape: Output,
    spec: AutoBroadcastSpec,
) -> Result<Output, OpError> {
    if spec.is_explicit() {
        return Err(ValidationError::new(
            construction_label(version),
            ValidationRule::BroadcastModeConstructor,
            "axes_mapping input should be provided if explicit mode is used",
        )
        .into());
    }
    if version == BroadcastVersion::V1 && spec.kind == AutoBroadcastType::Bidirectional {
        return Err(UnsupportedError::new(
            construction_label(version),
            "autobroadcast",
            format!("unknown autobroadcast type {spec}"),
        )
        .into());
    }

    let mark = graph.len();
    let placeholder = constant(graph, ElementType::U8, Shape::scalar(), ConstantValues::Int(vec![0]))?;
    let kind = OpKind::Broadcast(Broadcast::new(version, spec));
    match graph.add_node(kind, vec![arg, target_shape, placeholder]) {
        Ok(id) => Ok(id.into()),
        Err(err) => {
            graph.truncate(mark);
            Err(err.into())
        }
    }
}

pub fn broadcast_v1(
    graph: &mut Graph,
    arg: Output,
    target_shape: Output,
    axes_mapping: Output,
    spec: AutoBroadcastSpec,
) -> Result<Output, OpError> {
    broadcast_explicit(graph, BroadcastVersion::V1, arg, target_shape, axes_mapping, spec)
}

pub fn broadcast_v1_auto(
    graph: &mut Graph,
    arg: Output,
    target_shape: Output,
    spec: AutoBroadcastSpec,
) -> Result<Output, OpError> {
    broadcast_auto(graph, BroadcastVersion::V1, arg, target_shape, spec)
}

pub fn broadcast_v3(
    graph: &mut Graph,
    arg: Output,
    target_shape: Output,
    axes_mapping: Output,
    spec: AutoBroadcastSpec,
) -> Result<Output, OpError> {
    broadcast_explicit(graph, BroadcastVersion::V3, arg, target_shape, axes_mapping, spec)
}

pub fn broadcast_v3_auto(
    graph: &mut Graph,
    arg: Output,
    target_shape: Output,
    spec: AutoBroadcastSpec,
) -> Result<Output, OpError> {
    broadcast_auto(graph, BroadcastVersion::V3, arg, target_shape, spec)
}
