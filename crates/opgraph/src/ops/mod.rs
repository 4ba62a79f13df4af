//! Op graph: node kinds, the arena that owns them, shape inference and adjoints.
//!
//! Builders are grouped by opset revision. A builder validates the new node before it is
//! inserted and returns the handle of its first output:
//!
//! ```
//! use opgraph::ops::{self, Graph};
//! use opgraph::tensor::{AxisSet, ElementType, Shape};
//!
//! let mut graph = Graph::new();
//! let x = ops::v0::parameter(&mut graph, ElementType::F32, Shape::new(vec![3]));
//! let y = ops::v0::broadcast(&mut graph, x, Shape::new(vec![2, 3]), AxisSet::from([0])).unwrap();
//! assert_eq!(graph.partial_shape(y).to_string(), "{2,3}");
//! ```

pub mod attrs;
pub mod autobroadcast;
pub mod autodiff;
pub mod error;
pub mod graph;
pub mod kinds;
mod node;

pub use attrs::{AttrValue, AttributeVisitor, JsonAttributeVisitor};
pub use autobroadcast::{AutoBroadcastSpec, AutoBroadcastType};
pub use autodiff::{AdjointCx, Adjoints};
pub use error::{OpError, UnsupportedError, ValidationError, ValidationRule};
pub use graph::{Graph, InferCx, NodeRecord};
pub use kinds::{Op, OpKind};
pub use node::{NodeId, NodeTypeInfo, Output, OutputDesc};

pub mod v0 {
    pub use super::kinds::arith::sum;
    pub use super::kinds::broadcast::{broadcast_like, broadcast_v0 as broadcast};
    pub use super::kinds::concat::concat;
    pub use super::kinds::constant::{constant, constant_i64};
    pub use super::kinds::parameter::parameter;
}

pub mod v1 {
    pub use super::kinds::arith::add;
    pub use super::kinds::broadcast::{broadcast_v1 as broadcast, broadcast_v1_auto as broadcast_auto};
}

pub mod v2 {
    pub use super::kinds::scatter_update::scatter_update;
}

pub mod v3 {
    pub use super::kinds::broadcast::{broadcast_v3 as broadcast, broadcast_v3_auto as broadcast_auto};
}
