use crate::ops::attrs::{AttrValue, AttributeVisitor};
use crate::ops::error::{node_check, ValidationError, ValidationRule};
use crate::ops::graph::{Graph, InferCx};
use crate::ops::node::{NodeTypeInfo, Output};
use crate::tensor::{Dimension, ElementType, PartialShape};

use super::{Op, OpKind};

/// Joins its inputs along `axis`.
#[derive(Debug, Clone, PartialEq)]
pub struct Concat {
    axis: i64,
}

impl Concat {
    pub fn new(axis: i64) -> Self {
        Self { axis }
    }

    pub fn axis(&self) -> i64 {
        self.axis
    }
}

impl Op for Concat {
    fn type_info(&self) -> NodeTypeInfo {
        NodeTypeInfo::new("Concat", 0)
    }

    fn arity(&self) -> Option<usize> {
        None
    }

    fn validate_and_infer(&mut self, cx: &mut InferCx<'_>) -> Result<(), ValidationError> {
        node_check!(
            cx,
            cx.input_count() > 0,
            ValidationRule::InputCount,
            "concat needs at least one input"
        );

        let mut element_type = ElementType::Dynamic;
        let mut joined: Option<Vec<Dimension>> = None;
        let mut axis = None;
        for index in 0..cx.input_count() {
            let input_type = cx.input_element_type(index);
            let merged = element_type.merge(input_type);
            node_check!(
                cx,
                merged.is_some(),
                ValidationRule::ElementTypeMismatch,
                "input {index} has element type {input_type}, expected {element_type}"
            );
            element_type = merged.unwrap_or(element_type);

            let Some(dims) = cx.input_partial_shape(index).dims() else {
                continue;
            };
            let rank = dims.len();
            let concat_axis = match axis {
                Some(axis) => axis,
                None => {
                    let normalized = if self.axis < 0 {
                        self.axis + rank as i64
                    } else {
                        self.axis
                    };
                    node_check!(
                        cx,
                        normalized >= 0 && (normalized as usize) < rank,
                        ValidationRule::AxisOutOfRange,
                        "concat axis {} out of range for rank {rank}",
                        self.axis
                    );
                    axis = Some(normalized as usize);
                    normalized as usize
                }
            };

            if let Some(acc) = joined.as_mut() {
                node_check!(
                    cx,
                    acc.len() == rank,
                    ValidationRule::RankMismatch,
                    "input {index} has rank {rank}, expected {}",
                    acc.len()
                );
                for (position, dim) in dims.iter().enumerate() {
                    if position == concat_axis {
                        acc[position] = match (acc[position], *dim) {
                            (Dimension::Static(lhs), Dimension::Static(rhs)) => {
                                Dimension::Static(lhs + rhs)
                            }
                            _ => Dimension::Dynamic,
                        };
                        continue;
                    }
                    let merged = acc[position].merge(*dim);
                    node_check!(
                        cx,
                        merged.is_some(),
                        ValidationRule::IncompatibleShapes,
                        "input {index} dimension {position} is {dim}, expected {}",
                        acc[position]
                    );
                    acc[position] = merged.unwrap_or(*dim);
                }
            } else {
                joined = Some(dims.to_vec());
            }
        }

        // Unranked inputs make the concatenated extent unknown.
        let all_ranked = (0..cx.input_count())
            .all(|index| cx.input_partial_shape(index).rank_is_static());
        let shape = match (joined, axis) {
            (Some(mut dims), Some(axis)) => {
                if !all_ranked {
                    dims[axis] = Dimension::Dynamic;
                }
                PartialShape::new(dims)
            }
            _ => PartialShape::dynamic(),
        };
        cx.set_output_type(0, element_type, shape);
        Ok(())
    }

    fn visit_attributes(&self, visitor: &mut dyn AttributeVisitor) {
        visitor.on_attribute("axis", AttrValue::I64(self.axis));
    }
}

pub fn concat(graph: &mut Graph, inputs: Vec<Output>, axis: i64) -> Result<Output, ValidationError> {
    Ok(graph.add_node(OpKind::Concat(Concat::new(axis)), inputs)?.into())
}
