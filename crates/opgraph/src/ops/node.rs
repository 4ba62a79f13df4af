use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tensor::{ElementType, PartialShape};

/// Stable handle of a node inside a [`Graph`](super::graph::Graph) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn output(self, index: usize) -> Output {
        Output { node: self, index }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Edge endpoint: output `index` of producer `node`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Output {
    pub node: NodeId,
    pub index: usize,
}

impl Output {
    pub fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

impl From<NodeId> for Output {
    fn from(node: NodeId) -> Self {
        node.output(0)
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.index)
    }
}

/// Kind identifier plus revision, e.g. `ScatterUpdate.v2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeTypeInfo {
    pub name: &'static str,
    pub version: u64,
}

impl NodeTypeInfo {
    pub const fn new(name: &'static str, version: u64) -> Self {
        Self { name, version }
    }
}

impl fmt::Display for NodeTypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.v{}", self.name, self.version)
    }
}

/// Inferred element type and shape of one node output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputDesc {
    pub element_type: ElementType,
    pub shape: PartialShape,
}

impl OutputDesc {
    pub fn new(element_type: ElementType, shape: PartialShape) -> Self {
        Self {
            element_type,
            shape,
        }
    }

    pub fn dynamic() -> Self {
        Self::new(ElementType::Dynamic, PartialShape::dynamic())
    }

    /// Combines with a freshly inferred description, keeping every piece of static information.
    pub fn merge(&self, other: &OutputDesc) -> Option<OutputDesc> {
        Some(OutputDesc {
            element_type: self.element_type.merge(other.element_type)?,
            shape: self.shape.merge(&other.shape)?,
        })
    }
}

impl fmt::Display for OutputDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.element_type, self.shape)
    }
}
