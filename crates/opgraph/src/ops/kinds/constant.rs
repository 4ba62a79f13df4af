use serde::{Deserialize, Serialize};

use crate::ops::attrs::{AttrValue, AttributeVisitor};
use crate::ops::error::{node_check, ValidationError, ValidationRule};
use crate::ops::graph::{Graph, InferCx};
use crate::ops::node::{NodeTypeInfo, Output};
use crate::tensor::{AxisVector, ElementType, Shape};

use super::{Op, OpKind};

/// Literal payload of a constant. A single value is splatted over the whole shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstantValues {
    Int(Vec<i64>),
    Float(Vec<f64>),
}

impl ConstantValues {
    pub fn len(&self) -> usize {
        match self {
            ConstantValues::Int(values) => values.len(),
            ConstantValues::Float(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            ConstantValues::Int(values) => Some(values),
            ConstantValues::Float(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    element_type: ElementType,
    shape: Shape,
    values: ConstantValues,
}

impl Constant {
    pub fn new(element_type: ElementType, shape: Shape, values: ConstantValues) -> Self {
        Self {
            element_type,
            shape,
            values,
        }
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn values(&self) -> &ConstantValues {
        &self.values
    }

    /// Integer values expanded to the element count; `None` for float payloads.
    pub fn int_values(&self) -> Option<Vec<i64>> {
        let values = self.values.as_ints()?;
        let count = self.shape.num_elements();
        match values {
            [single] if count != 1 => Some(vec![*single; count]),
            _ => Some(values.to_vec()),
        }
    }

    /// Values read as axis indices or extents; `None` if any value is negative or non-integral.
    pub fn axis_vector_value(&self) -> Option<AxisVector> {
        self.int_values()?
            .into_iter()
            .map(|value| usize::try_from(value).ok())
            .collect()
    }

    /// Values read as a static shape.
    pub fn shape_value(&self) -> Option<Shape> {
        self.axis_vector_value()
            .map(|dims| Shape::new(dims.into_iter().collect::<Vec<_>>()))
    }
}

impl Op for Constant {
    fn type_info(&self) -> NodeTypeInfo {
        NodeTypeInfo::new("Constant", 0)
    }

    fn arity(&self) -> Option<usize> {
        Some(0)
    }

    fn validate_and_infer(&mut self, cx: &mut InferCx<'_>) -> Result<(), ValidationError> {
        let element_type = self.element_type;
        node_check!(
            cx,
            element_type.is_static(),
            ValidationRule::DynamicElementType,
            "constant element type must be static"
        );
        let count = self.shape.num_elements();
        let provided = self.values.len();
        node_check!(
            cx,
            provided == count || (provided == 1 && count > 0),
            ValidationRule::ConstantValueCount,
            "constant of shape {} needs {count} values, got {provided}",
            self.shape
        );
        node_check!(
            cx,
            !(matches!(self.values, ConstantValues::Float(_)) && element_type.is_integral_number()),
            ValidationRule::ElementTypeMismatch,
            "float values cannot initialize a constant of type {element_type}"
        );
        cx.set_output_type(0, element_type, self.shape.clone().into());
        Ok(())
    }

    fn visit_attributes(&self, visitor: &mut dyn AttributeVisitor) {
        visitor.on_attribute("element_type", AttrValue::ElementType(self.element_type));
        visitor.on_attribute("shape", AttrValue::Shape(&self.shape));
        visitor.on_attribute("value", AttrValue::Values(&self.values));
    }
}

pub fn constant(
    graph: &mut Graph,
    element_type: ElementType,
    shape: impl Into<Shape>,
    values: ConstantValues,
) -> Result<Output, ValidationError> {
    let kind = OpKind::Constant(Constant::new(element_type, shape.into(), values));
    Ok(graph.add_node(kind, Vec::new())?.into())
}

/// Rank-1 `i64` constant, the usual carrier of target shapes and axis lists.
pub fn constant_i64(graph: &mut Graph, values: &[i64]) -> Result<Output, ValidationError> {
    constant(
        graph,
        ElementType::I64,
        Shape::new(vec![values.len()]),
        ConstantValues::Int(values.to_vec()),
    )
}
