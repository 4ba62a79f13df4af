//! Static and partially-known tensor shapes.
//!
//! [`PartialShape`] is the shape type carried on node outputs: its rank may be unknown, and
//! each dimension of a ranked shape is either a concrete extent or [`Dimension::Dynamic`].
//! Compatibility treats unknowns as wildcards at both granularities; merging combines two
//! compatible shapes into the most precise shape consistent with both.

use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// Single axis extent, possibly unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Static(usize),
    Dynamic,
}

impl Dimension {
    pub fn is_static(self) -> bool {
        matches!(self, Dimension::Static(_))
    }

    pub fn is_dynamic(self) -> bool {
        !self.is_static()
    }

    pub fn get_length(self) -> Option<usize> {
        match self {
            Dimension::Static(len) => Some(len),
            Dimension::Dynamic => None,
        }
    }

    pub fn compatible(self, other: Dimension) -> bool {
        self.merge(other).is_some()
    }

    /// Unifies two dimensions; a dynamic side yields to the other.
    pub fn merge(self, other: Dimension) -> Option<Dimension> {
        match (self, other) {
            (Dimension::Dynamic, other) | (other, Dimension::Dynamic) => Some(other),
            (Dimension::Static(lhs), Dimension::Static(rhs)) if lhs == rhs => Some(self),
            _ => None,
        }
    }

    /// Broadcast-merges two aligned dimensions (`a == 1 || b == 1 || a == b`).
    ///
    /// A dynamic side paired with a concrete extent greater than one resolves to that extent,
    /// since the dynamic extent must be either 1 or equal at run time.
    pub fn broadcast_merge(self, other: Dimension) -> Option<Dimension> {
        match (self, other) {
            (Dimension::Static(1), other) | (other, Dimension::Static(1)) => Some(other),
            (Dimension::Static(lhs), Dimension::Static(rhs)) => {
                (lhs == rhs).then_some(Dimension::Static(lhs))
            }
            (Dimension::Dynamic, Dimension::Dynamic) => Some(Dimension::Dynamic),
            (Dimension::Dynamic, fixed) | (fixed, Dimension::Dynamic) => Some(fixed),
        }
    }
}

impl From<usize> for Dimension {
    fn from(value: usize) -> Self {
        Dimension::Static(value)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Static(len) => write!(f, "{len}"),
            Dimension::Dynamic => f.write_str("?"),
        }
    }
}

/// Shape whose rank and dimensions may be partially unknown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartialShape {
    dims: Option<Vec<Dimension>>,
}

impl PartialShape {
    /// Shape of unknown rank.
    pub fn dynamic() -> Self {
        Self { dims: None }
    }

    /// Shape of known rank with every dimension unknown.
    pub fn with_rank(rank: usize) -> Self {
        Self {
            dims: Some(vec![Dimension::Dynamic; rank]),
        }
    }

    pub fn new(dims: impl Into<Vec<Dimension>>) -> Self {
        Self {
            dims: Some(dims.into()),
        }
    }

    pub fn from_static(dims: &[usize]) -> Self {
        Self::new(dims.iter().copied().map(Dimension::Static).collect::<Vec<_>>())
    }

    pub fn rank(&self) -> Option<usize> {
        self.dims.as_ref().map(Vec::len)
    }

    pub fn rank_is_static(&self) -> bool {
        self.dims.is_some()
    }

    /// Returns `true` when the rank is unknown or equal to `rank`.
    pub fn rank_compatible(&self, rank: usize) -> bool {
        self.rank().map_or(true, |actual| actual == rank)
    }

    /// A shape is static when its rank and every dimension are known.
    pub fn is_static(&self) -> bool {
        self.dims
            .as_ref()
            .is_some_and(|dims| dims.iter().all(|dim| dim.is_static()))
    }

    pub fn is_dynamic(&self) -> bool {
        !self.is_static()
    }

    pub fn dims(&self) -> Option<&[Dimension]> {
        self.dims.as_deref()
    }

    pub fn get(&self, axis: usize) -> Option<Dimension> {
        self.dims.as_ref().and_then(|dims| dims.get(axis).copied())
    }

    /// Converts into a static [`Shape`] when fully known.
    pub fn to_shape(&self) -> Option<Shape> {
        let dims = self.dims.as_ref()?;
        dims.iter()
            .map(|dim| dim.get_length())
            .collect::<Option<Vec<_>>>()
            .map(Shape::new)
    }

    pub fn compatible(&self, other: &PartialShape) -> bool {
        self.merge(other).is_some()
    }

    /// Combines two compatible shapes into the most precise shape consistent with both.
    pub fn merge(&self, other: &PartialShape) -> Option<PartialShape> {
        match (&self.dims, &other.dims) {
            (None, _) => Some(other.clone()),
            (_, None) => Some(self.clone()),
            (Some(lhs), Some(rhs)) => {
                if lhs.len() != rhs.len() {
                    return None;
                }
                lhs.iter()
                    .zip(rhs.iter())
                    .map(|(a, b)| a.merge(*b))
                    .collect::<Option<Vec<_>>>()
                    .map(PartialShape::new)
            }
        }
    }

    /// Returns `true` when `self` is compatible with `other` and at least as precise.
    pub fn refines(&self, other: &PartialShape) -> bool {
        self.merge(other).as_ref() == Some(self)
    }

    /// Number of known-static dimensions; zero for unknown rank.
    pub fn static_dim_count(&self) -> usize {
        self.dims
            .as_ref()
            .map_or(0, |dims| dims.iter().filter(|dim| dim.is_static()).count())
    }
}

impl Index<usize> for PartialShape {
    type Output = Dimension;

    fn index(&self, axis: usize) -> &Dimension {
        let dims = self
            .dims
            .as_ref()
            .expect("cannot index a shape of dynamic rank");
        &dims[axis]
    }
}

impl IndexMut<usize> for PartialShape {
    fn index_mut(&mut self, axis: usize) -> &mut Dimension {
        let dims = self
            .dims
            .as_mut()
            .expect("cannot index a shape of dynamic rank");
        &mut dims[axis]
    }
}

impl From<Shape> for PartialShape {
    fn from(shape: Shape) -> Self {
        PartialShape::from_static(shape.dims())
    }
}

impl From<&Shape> for PartialShape {
    fn from(shape: &Shape) -> Self {
        PartialShape::from_static(shape.dims())
    }
}

impl From<Vec<Dimension>> for PartialShape {
    fn from(dims: Vec<Dimension>) -> Self {
        PartialShape::new(dims)
    }
}

impl fmt::Display for PartialShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.dims {
            None => f.write_str("?"),
            Some(dims) => {
                let joined = dims
                    .iter()
                    .map(Dimension::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                write!(f, "{{{joined}}}")
            }
        }
    }
}

/// Fully static shape. Rank zero denotes a scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self { dims: dims.into() }
    }

    pub fn scalar() -> Self {
        Self { dims: Vec::new() }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Number of elements implied by the shape (1 for scalars).
    pub fn num_elements(&self) -> usize {
        shape_size(&self.dims)
    }

    pub fn checked_num_elements(&self) -> Option<usize> {
        self.dims
            .iter()
            .try_fold(1usize, |acc, dim| acc.checked_mul(*dim))
    }
}

impl Index<usize> for Shape {
    type Output = usize;

    fn index(&self, axis: usize) -> &usize {
        &self.dims[axis]
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::new(dims.to_vec())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .dims
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "{{{joined}}}")
    }
}

/// Product of the dimensions; 1 for an empty slice.
pub fn shape_size(dims: &[usize]) -> usize {
    dims.iter().product()
}
