use crate::ops::attrs::{AttrValue, AttributeVisitor};
use crate::ops::error::ValidationError;
use crate::ops::graph::{Graph, InferCx};
use crate::ops::node::{NodeTypeInfo, Output};
use crate::tensor::{ElementType, PartialShape};

use super::{Op, OpKind};

/// Graph input with a declared, possibly partial, type.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    element_type: ElementType,
    shape: PartialShape,
}

impl Parameter {
    pub fn new(element_type: ElementType, shape: PartialShape) -> Self {
        Self {
            element_type,
            shape,
        }
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn partial_shape(&self) -> &PartialShape {
        &self.shape
    }

    pub(crate) fn set_partial_shape(&mut self, element_type: ElementType, shape: PartialShape) {
        self.element_type = element_type;
        self.shape = shape;
    }
}

impl Op for Parameter {
    fn type_info(&self) -> NodeTypeInfo {
        NodeTypeInfo::new("Parameter", 0)
    }

    fn arity(&self) -> Option<usize> {
        Some(0)
    }

    fn validate_and_infer(&mut self, cx: &mut InferCx<'_>) -> Result<(), ValidationError> {
        cx.set_output_type(0, self.element_type, self.shape.clone());
        Ok(())
    }

    fn visit_attributes(&self, visitor: &mut dyn AttributeVisitor) {
        visitor.on_attribute("shape", AttrValue::PartialShape(&self.shape));
        visitor.on_attribute("element_type", AttrValue::ElementType(self.element_type));
    }
}

pub fn parameter(graph: &mut Graph, element_type: ElementType, shape: impl Into<PartialShape>) -> Output {
    let kind = OpKind::Parameter(Parameter::new(element_type, shape.into()));
    graph
        .add_node(kind, Vec::new())
        .expect("parameters have no inputs to validate")
        .into()
}
