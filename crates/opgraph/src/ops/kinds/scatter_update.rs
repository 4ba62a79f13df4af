use crate::ops::attrs::{AttrValue, AttributeVisitor};
use crate::ops::autodiff::AdjointCx;
use crate::ops::error::{node_check, OpError, ValidationError, ValidationRule};
use crate::ops::graph::{Graph, InferCx};
use crate::ops::node::{NodeTypeInfo, Output};
use crate::tensor::{ElementType, PartialShape};

use super::{Op, OpKind};

/// Writes slices of `updates` into a copy of `inputs` at positions selected by `indices`
/// along `axis`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScatterUpdate {
    axis: i64,
}

impl ScatterUpdate {
    pub fn new(axis: i64) -> Self {
        Self { axis }
    }

    pub fn axis(&self) -> i64 {
        self.axis
    }

    /// Axis normalized against `rank`; `None` when out of range.
    pub fn normalized_axis(&self, rank: usize) -> Option<usize> {
        let axis = if self.axis < 0 {
            self.axis + rank as i64
        } else {
            self.axis
        };
        (axis >= 0 && (axis as usize) < rank).then_some(axis as usize)
    }
}

impl Op for ScatterUpdate {
    fn type_info(&self) -> NodeTypeInfo {
        NodeTypeInfo::new("ScatterUpdate", 2)
    }

    fn arity(&self) -> Option<usize> {
        Some(3)
    }

    fn validate_and_infer(&mut self, cx: &mut InferCx<'_>) -> Result<(), ValidationError> {
        let index_type = cx.input_element_type(1);
        node_check!(
            cx,
            matches!(
                index_type,
                ElementType::I32 | ElementType::I64 | ElementType::Dynamic
            ),
            ValidationRule::IndexTypeRequired,
            "indices element type must be i64 or i32, got {index_type}"
        );
        let (data_type, updates_type) = (cx.input_element_type(0), cx.input_element_type(2));
        let element_type = data_type.merge(updates_type);
        node_check!(
            cx,
            element_type.is_some(),
            ValidationRule::ElementTypeMismatch,
            "updates element type ({updates_type}) must match inputs element type ({data_type})"
        );

        let data = cx.input_partial_shape(0);
        let indices = cx.input_partial_shape(1);
        let updates = cx.input_partial_shape(2);
        if let Some(rank) = data.rank() {
            let axis = self.normalized_axis(rank);
            node_check!(
                cx,
                axis.is_some(),
                ValidationRule::AxisOutOfRange,
                "axis {} out of range for inputs of rank {rank}",
                self.axis
            );
            if let (Some(axis), Some(data_dims), Some(index_dims), Some(update_dims)) =
                (axis, data.dims(), indices.dims(), updates.dims())
            {
                node_check!(
                    cx,
                    update_dims.len() == index_dims.len() + data_dims.len() - 1,
                    ValidationRule::RankMismatch,
                    "updates rank {} must be indices rank {} plus inputs rank {} minus 1",
                    update_dims.len(),
                    index_dims.len(),
                    data_dims.len()
                );
                let expected = PartialShape::new(
                    data_dims[..axis]
                        .iter()
                        .chain(index_dims.iter())
                        .chain(data_dims[axis + 1..].iter())
                        .copied()
                        .collect::<Vec<_>>(),
                );
                node_check!(
                    cx,
                    updates.compatible(&expected),
                    ValidationRule::IncompatibleShapes,
                    "updates shape {updates} does not match expected {expected}"
                );
            }
        }

        cx.set_output_type(0, element_type.unwrap_or(data_type), data.clone());
        Ok(())
    }

    fn visit_attributes(&self, visitor: &mut dyn AttributeVisitor) {
        visitor.on_attribute("axis", AttrValue::I64(self.axis));
    }

    fn generate_adjoints(&self, cx: &mut AdjointCx<'_>, _deltas: &[Output]) -> Result<(), OpError> {
        Err(cx.unsupported("differentiation", "not yet implemented").into())
    }
}

pub fn scatter_update(
    graph: &mut Graph,
    inputs: Output,
    indices: Output,
    updates: Output,
    axis: i64,
) -> Result<Output, ValidationError> {
    let kind = OpKind::ScatterUpdate(ScatterUpdate::new(axis));
    Ok(graph.add_node(kind, vec![inputs, indices, updates])?.into())
}
