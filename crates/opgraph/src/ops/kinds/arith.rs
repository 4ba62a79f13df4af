use crate::ops::attrs::{AttrValue, AttributeVisitor};
use crate::ops::autobroadcast::{numpy_broadcast_shapes, AutoBroadcastSpec, AutoBroadcastType};
use crate::ops::autodiff::AdjointCx;
use crate::ops::error::{node_check, OpError, UnsupportedError, ValidationError, ValidationRule};
use crate::ops::graph::{Graph, InferCx};
use crate::ops::node::{NodeTypeInfo, Output};
use crate::tensor::{AxisSet, AxisVector, PartialShape};

use super::broadcast::{accumulate_broadcast_delta, broadcast_v0, BroadcastAxes};
use super::{Op, OpKind};

/// Elementwise addition with optional NumPy-style broadcasting.
#[derive(Debug, Clone, PartialEq)]
pub struct Add {
    spec: AutoBroadcastSpec,
}

impl Add {
    pub fn new(spec: AutoBroadcastSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> AutoBroadcastSpec {
        self.spec
    }
}

impl Op for Add {
    fn type_info(&self) -> NodeTypeInfo {
        NodeTypeInfo::new("Add", 1)
    }

    fn arity(&self) -> Option<usize> {
        Some(2)
    }

    fn validate_and_infer(&mut self, cx: &mut InferCx<'_>) -> Result<(), ValidationError> {
        let (lhs_type, rhs_type) = (cx.input_element_type(0), cx.input_element_type(1));
        let element_type = lhs_type.merge(rhs_type);
        node_check!(
            cx,
            element_type.is_some(),
            ValidationRule::ElementTypeMismatch,
            "argument element types are inconsistent ({lhs_type} vs {rhs_type})"
        );

        let (lhs, rhs) = (cx.input_partial_shape(0), cx.input_partial_shape(1));
        let shape = match self.spec.kind {
            AutoBroadcastType::None => {
                let merged = lhs.merge(rhs);
                node_check!(
                    cx,
                    merged.is_some(),
                    ValidationRule::IncompatibleShapes,
                    "argument shapes are inconsistent ({lhs} vs {rhs})"
                );
                merged
            }
            _ => {
                let merged = numpy_broadcast_shapes(lhs, rhs);
                node_check!(
                    cx,
                    merged.is_some(),
                    ValidationRule::BroadcastIncompatible,
                    "argument shapes cannot be broadcast ({lhs} vs {rhs})"
                );
                merged
            }
        };

        if let (Some(element_type), Some(shape)) = (element_type, shape) {
            cx.set_output_type(0, element_type, shape);
        }
        Ok(())
    }

    fn visit_attributes(&self, visitor: &mut dyn AttributeVisitor) {
        visitor.on_attribute("auto_broadcast", AttrValue::BroadcastSpec(&self.spec));
    }

    fn supports_adjoints(&self) -> bool {
        true
    }

    fn generate_adjoints(&self, cx: &mut AdjointCx<'_>, deltas: &[Output]) -> Result<(), OpError> {
        let delta = deltas[0];
        let output_shape = cx.output_partial_shape(0);
        for index in 0..2 {
            let input = cx.input_value(index);
            let input_shape = cx.input_partial_shape(index);
            if self.spec.is_explicit() || input_shape == output_shape {
                cx.add_delta(input, delta)?;
                continue;
            }
            let (Some(input_static), Some(output_static)) =
                (input_shape.to_shape(), output_shape.to_shape())
            else {
                return Err(cx
                    .unsupported("differentiation", "broadcasting add with dynamic shapes")
                    .into());
            };
            let start = output_static.rank() - input_static.rank();
            let axes: AxisSet = (0..output_static.rank())
                .filter(|axis| *axis < start || input_static[*axis - start] != output_static[*axis])
                .collect();
            let resolved = BroadcastAxes {
                axes,
                operand_dims: (start..output_static.rank()).collect::<AxisVector>(),
            };
            accumulate_broadcast_delta(cx, input, delta, &resolved)?;
        }
        Ok(())
    }
}

pub fn add(graph: &mut Graph, lhs: Output, rhs: Output, spec: AutoBroadcastSpec) -> Result<Output, OpError> {
    if matches!(spec.kind, AutoBroadcastType::Pdpd | AutoBroadcastType::Bidirectional) {
        return Err(UnsupportedError::new(
            "Add.v1 (construction)",
            "autobroadcast",
            format!("{spec} is not available for Add"),
        )
        .into());
    }
    Ok(graph.add_node(OpKind::Add(Add::new(spec)), vec![lhs, rhs])?.into())
}

/// Sum-reduction over a fixed set of axes.
#[derive(Debug, Clone, PartialEq)]
pub struct Sum {
    reduction_axes: AxisSet,
}

impl Sum {
    pub fn new(reduction_axes: AxisSet) -> Self {
        Self { reduction_axes }
    }

    pub fn reduction_axes(&self) -> &AxisSet {
        &self.reduction_axes
    }
}

impl Op for Sum {
    fn type_info(&self) -> NodeTypeInfo {
        NodeTypeInfo::new("Sum", 0)
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }

    fn validate_and_infer(&mut self, cx: &mut InferCx<'_>) -> Result<(), ValidationError> {
        let element_type = cx.input_element_type(0);
        let input = cx.input_partial_shape(0);
        let shape = match input.dims() {
            None => PartialShape::dynamic(),
            Some(dims) => {
                if let Some(max) = self.reduction_axes.max() {
                    node_check!(
                        cx,
                        max < dims.len(),
                        ValidationRule::AxisOutOfRange,
                        "reduction axis {max} out of bounds for input shape {input}"
                    );
                }
                PartialShape::new(
                    dims.iter()
                        .enumerate()
                        .filter(|(axis, _)| !self.reduction_axes.contains(*axis))
                        .map(|(_, dim)| *dim)
                        .collect::<Vec<_>>(),
                )
            }
        };
        cx.set_output_type(0, element_type, shape);
        Ok(())
    }

    fn visit_attributes(&self, visitor: &mut dyn AttributeVisitor) {
        visitor.on_attribute("reduction_axes", AttrValue::AxisSet(&self.reduction_axes));
    }

    fn supports_adjoints(&self) -> bool {
        true
    }

    fn generate_adjoints(&self, cx: &mut AdjointCx<'_>, deltas: &[Output]) -> Result<(), OpError> {
        let input = cx.input_value(0);
        let Some(input_shape) = cx.input_partial_shape(0).to_shape() else {
            return Err(cx
                .unsupported("differentiation", "sum over an input of dynamic shape")
                .into());
        };
        let expanded = broadcast_v0(cx.graph_mut(), deltas[0], input_shape, self.reduction_axes.clone())?;
        cx.add_delta(input, expanded)
    }
}

pub fn sum(graph: &mut Graph, arg: Output, reduction_axes: AxisSet) -> Result<Output, ValidationError> {
    Ok(graph.add_node(OpKind::Sum(Sum::new(reduction_axes)), vec![arg])?.into())
}
