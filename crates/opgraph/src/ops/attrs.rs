//! Generic attribute visitation for serialization and inspection.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::ops::autobroadcast::AutoBroadcastSpec;
use crate::ops::kinds::ConstantValues;
use crate::tensor::{AxisSet, ElementType, PartialShape, Shape};

/// Borrowed attribute value handed to an [`AttributeVisitor`].
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(untagged)]
pub enum AttrValue<'a> {
    Shape(&'a Shape),
    PartialShape(&'a PartialShape),
    AxisSet(&'a AxisSet),
    BroadcastSpec(&'a AutoBroadcastSpec),
    ElementType(ElementType),
    I64(i64),
    Values(&'a ConstantValues),
}

/// Receives each named attribute of a node in declaration order.
pub trait AttributeVisitor {
    fn on_attribute(&mut self, name: &str, value: AttrValue<'_>);
}

/// Collects attributes into a JSON object keyed by attribute name.
#[derive(Debug, Default)]
pub struct JsonAttributeVisitor {
    attrs: Map<String, Value>,
    error: Option<serde_json::Error>,
}

impl JsonAttributeVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_value(self) -> Result<Value, serde_json::Error> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(Value::Object(self.attrs)),
        }
    }
}

impl AttributeVisitor for JsonAttributeVisitor {
    fn on_attribute(&mut self, name: &str, value: AttrValue<'_>) {
        if self.error.is_some() {
            return;
        }
        match serde_json::to_value(value) {
            Ok(json) => {
                self.attrs.insert(name.to_string(), json);
            }
            Err(err) => self.error = Some(err),
        }
    }
}

/// Records attribute names only.
#[derive(Debug, Default)]
pub struct AttributeNames(pub Vec<String>);

impl AttributeVisitor for AttributeNames {
    fn on_attribute(&mut self, name: &str, _value: AttrValue<'_>) {
        self.0.push(name.to_string());
    }
}
