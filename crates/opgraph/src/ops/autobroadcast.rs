//! Autobroadcast mode selection and the alignment rules shared by broadcasting ops.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tensor::{Dimension, PartialShape};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoBroadcastType {
    /// Explicit per-axis mapping required.
    None,
    /// Trailing-axis alignment.
    Numpy,
    /// Alignment at an explicit start axis.
    Pdpd,
    /// Both sides are left-padded with 1s to a common rank before alignment.
    Bidirectional,
}

impl AutoBroadcastType {
    pub fn as_str(self) -> &'static str {
        match self {
            AutoBroadcastType::None => "none",
            AutoBroadcastType::Numpy => "numpy",
            AutoBroadcastType::Pdpd => "pdpd",
            AutoBroadcastType::Bidirectional => "bidirectional",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AutoBroadcastSpec {
    pub kind: AutoBroadcastType,
    /// Start axis for PDPD alignment; negative values align trailing axes.
    pub axis: i64,
}

impl AutoBroadcastSpec {
    pub const NONE: AutoBroadcastSpec = AutoBroadcastSpec::new(AutoBroadcastType::None);
    pub const NUMPY: AutoBroadcastSpec = AutoBroadcastSpec::new(AutoBroadcastType::Numpy);
    pub const BIDIRECTIONAL: AutoBroadcastSpec =
        AutoBroadcastSpec::new(AutoBroadcastType::Bidirectional);

    pub const fn new(kind: AutoBroadcastType) -> Self {
        Self { kind, axis: 0 }
    }

    pub const fn pdpd(axis: i64) -> Self {
        Self {
            kind: AutoBroadcastType::Pdpd,
            axis,
        }
    }

    pub fn is_explicit(&self) -> bool {
        self.kind == AutoBroadcastType::None
    }

    /// Output axis that the first arg axis aligns with. May be negative when the target
    /// rank is smaller than the arg rank; callers reject that case.
    pub fn start_axis(&self, target_rank: usize, arg_rank: usize) -> i64 {
        match self.kind {
            AutoBroadcastType::Pdpd if self.axis >= 0 => self.axis,
            _ => target_rank as i64 - arg_rank as i64,
        }
    }
}

impl Default for AutoBroadcastSpec {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Display for AutoBroadcastSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AutoBroadcastType::Pdpd => write!(f, "pdpd(axis={})", self.axis),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Left-pads `dims` with static 1s up to `rank`.
pub fn pad_left(dims: &[Dimension], rank: usize) -> Vec<Dimension> {
    let mut padded = vec![Dimension::Static(1); rank.saturating_sub(dims.len())];
    padded.extend_from_slice(dims);
    padded
}

/// Bidirectional trailing-axis broadcast of two shapes.
///
/// Returns `None` when a pair of static dimensions is neither equal nor 1. Unknown rank on
/// either side yields an unknown-rank result.
pub fn numpy_broadcast_shapes(lhs: &PartialShape, rhs: &PartialShape) -> Option<PartialShape> {
    let (Some(lhs_dims), Some(rhs_dims)) = (lhs.dims(), rhs.dims()) else {
        return Some(PartialShape::dynamic());
    };
    let rank = lhs_dims.len().max(rhs_dims.len());
    let lhs_dims = pad_left(lhs_dims, rank);
    let rhs_dims = pad_left(rhs_dims, rank);
    lhs_dims
        .iter()
        .zip(rhs_dims.iter())
        .map(|(a, b)| a.broadcast_merge(*b))
        .collect::<Option<Vec<_>>>()
        .map(PartialShape::new)
}
