//! Axis collections used by node attributes.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Ordered axis list; order is significant (e.g. an axes mapping).
pub type AxisVector = SmallVec<[usize; 4]>;

/// Sorted, de-duplicated set of axes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AxisSet(BTreeSet<usize>);

impl AxisSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, axis: usize) -> bool {
        self.0.insert(axis)
    }

    pub fn contains(&self, axis: usize) -> bool {
        self.0.contains(&axis)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates in ascending order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    pub fn max(&self) -> Option<usize> {
        self.0.iter().next_back().copied()
    }

    pub fn to_vec(&self) -> Vec<usize> {
        self.0.iter().copied().collect()
    }

    /// Axes of `0..rank` not contained in the set, ascending.
    pub fn complement(&self, rank: usize) -> AxisVector {
        (0..rank).filter(|axis| !self.contains(*axis)).collect()
    }
}

impl FromIterator<usize> for AxisSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[usize; N]> for AxisSet {
    fn from(axes: [usize; N]) -> Self {
        axes.into_iter().collect()
    }
}

impl fmt::Display for AxisSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "{{{joined}}}")
    }
}

/// Collects an iterator of axes into an [`AxisVector`].
pub fn axis_vector<I>(iter: I) -> AxisVector
where
    I: IntoIterator<Item = usize>,
{
    iter.into_iter().collect()
}

/// Formats an axis vector as `{a,b,c}`.
pub fn format_axes(axes: &[usize]) -> String {
    let joined = axes
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{joined}}}")
}
