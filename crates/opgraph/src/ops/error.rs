use std::fmt;

use thiserror::Error;

/// Stable identifiers for the structural rules checked during node validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationRule {
    InputCount,
    UnknownInput,
    CycleDetected,
    DynamicElementType,
    ElementTypeMismatch,
    IntegralTypeRequired,
    IndexTypeRequired,
    RankMismatch,
    AxisOutOfRange,
    IncompatibleShapes,
    ConstantValueCount,
    NegativeShapeValue,
    BroadcastModeConstructor,
    AxesMappingSize,
    AxesMappingNotSorted,
    AxesMappingOutOfRange,
    AxesMappingDimMismatch,
    TargetRankTooSmall,
    BroadcastIncompatible,
    OutputConflict,
}

impl ValidationRule {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationRule::InputCount => "input count mismatch",
            ValidationRule::UnknownInput => "input references an unknown node output",
            ValidationRule::CycleDetected => "rewrite would introduce a cycle",
            ValidationRule::DynamicElementType => "element type must be static",
            ValidationRule::ElementTypeMismatch => "element type mismatch",
            ValidationRule::IntegralTypeRequired => "integral element type required",
            ValidationRule::IndexTypeRequired => "index element type must be i32 or i64",
            ValidationRule::RankMismatch => "rank mismatch",
            ValidationRule::AxisOutOfRange => "axis out of range",
            ValidationRule::IncompatibleShapes => "incompatible shapes",
            ValidationRule::ConstantValueCount => "constant value count does not match shape",
            ValidationRule::NegativeShapeValue => "shape values must be non-negative",
            ValidationRule::BroadcastModeConstructor => "broadcast mode does not match constructor",
            ValidationRule::AxesMappingSize => "axes mapping size mismatch",
            ValidationRule::AxesMappingNotSorted => "axes mapping must be strictly ascending",
            ValidationRule::AxesMappingOutOfRange => "axes mapping exceeds target rank",
            ValidationRule::AxesMappingDimMismatch => "axes mapping dimension mismatch",
            ValidationRule::TargetRankTooSmall => "target rank too small",
            ValidationRule::BroadcastIncompatible => "shapes are not broadcast-compatible",
            ValidationRule::OutputConflict => "inferred output contradicts known output",
        }
    }
}

impl fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node's inputs violate a structural, type or shape rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{node}: {rule}: {detail}")]
pub struct ValidationError {
    pub node: String,
    pub rule: ValidationRule,
    pub detail: String,
}

impl ValidationError {
    pub fn new(node: impl Into<String>, rule: ValidationRule, detail: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            rule,
            detail: detail.into(),
        }
    }
}

/// A requested capability has no implementation for the node, or for its current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{node}: {capability} is not supported: {reason}")]
pub struct UnsupportedError {
    pub node: String,
    pub capability: &'static str,
    pub reason: String,
}

impl UnsupportedError {
    pub fn new(node: impl Into<String>, capability: &'static str, reason: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            capability,
            reason: reason.into(),
        }
    }
}

/// Failure surfaced by op construction, rewriting or differentiation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Unsupported(#[from] UnsupportedError),
}

impl OpError {
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            OpError::Validation(err) => Some(err),
            OpError::Unsupported(_) => None,
        }
    }

    pub fn as_unsupported(&self) -> Option<&UnsupportedError> {
        match self {
            OpError::Unsupported(err) => Some(err),
            OpError::Validation(_) => None,
        }
    }
}

/// Returns early with a [`ValidationError`] built by `$cx.fail(..)` when `$cond` is false.
macro_rules! node_check {
    ($cx:expr, $cond:expr, $rule:expr, $($arg:tt)+) => {
        if !($cond) {
            return Err($cx.fail($rule, format!($($arg)+)).into());
        }
    };
}

pub(crate) use node_check;
