//! Node kinds and the [`Op`] contract they implement.

pub mod arith;
pub mod broadcast;
pub mod concat;
pub mod constant;
pub mod parameter;
pub mod scatter_update;

pub use arith::{Add, Sum};
pub use broadcast::{Broadcast, BroadcastAxes, BroadcastLike, BroadcastV0, BroadcastVersion};
pub use concat::Concat;
pub use constant::{Constant, ConstantValues};
pub use parameter::Parameter;
pub use scatter_update::ScatterUpdate;

use crate::ops::attrs::AttributeVisitor;
use crate::ops::autodiff::AdjointCx;
use crate::ops::error::{OpError, ValidationError};
use crate::ops::graph::InferCx;
use crate::ops::node::{NodeTypeInfo, Output};

/// Behaviour shared by every node kind.
pub trait Op {
    fn type_info(&self) -> NodeTypeInfo;

    /// Required input count; `None` for variadic kinds.
    fn arity(&self) -> Option<usize>;

    /// Checks the inputs and records output types. May cache derived attributes on `self`.
    fn validate_and_infer(&mut self, cx: &mut InferCx<'_>) -> Result<(), ValidationError>;

    fn visit_attributes(&self, visitor: &mut dyn AttributeVisitor);

    fn supports_adjoints(&self) -> bool {
        false
    }

    /// Adds input deltas given the deltas of this node's outputs.
    fn generate_adjoints(&self, cx: &mut AdjointCx<'_>, deltas: &[Output]) -> Result<(), OpError> {
        let _ = deltas;
        Err(cx
            .unsupported("differentiation", "no adjoint rule for this node kind")
            .into())
    }
}

/// Closed set of node kinds stored in the graph arena.
#[derive(Debug, Clone, PartialEq)]
pub enum OpKind {
    Parameter(Parameter),
    Constant(Constant),
    Concat(Concat),
    Add(Add),
    Sum(Sum),
    BroadcastV0(BroadcastV0),
    BroadcastLike(BroadcastLike),
    Broadcast(Broadcast),
    ScatterUpdate(ScatterUpdate),
}

macro_rules! dispatch {
    ($self:expr, $op:ident => $body:expr) => {
        match $self {
            OpKind::Parameter($op) => $body,
            OpKind::Constant($op) => $body,
            OpKind::Concat($op) => $body,
            OpKind::Add($op) => $body,
            OpKind::Sum($op) => $body,
            OpKind::BroadcastV0($op) => $body,
            OpKind::BroadcastLike($op) => $body,
            OpKind::Broadcast($op) => $body,
            OpKind::ScatterUpdate($op) => $body,
        }
    };
}

impl OpKind {
    pub fn as_op(&self) -> &dyn Op {
        dispatch!(self, op => op)
    }

    pub fn as_op_mut(&mut self) -> &mut dyn Op {
        dispatch!(self, op => op)
    }

    pub fn type_info(&self) -> NodeTypeInfo {
        self.as_op().type_info()
    }

    pub fn arity(&self) -> Option<usize> {
        self.as_op().arity()
    }

    pub fn supports_adjoints(&self) -> bool {
        self.as_op().supports_adjoints()
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            OpKind::Constant(constant) => Some(constant),
            _ => None,
        }
    }
}
