//! Shape and element-type algebra shared by the op graph and the dialect IR.

pub mod axes;
pub mod dtype;
pub mod shape;

pub use axes::{axis_vector, format_axes, AxisSet, AxisVector};
pub use dtype::ElementType;
pub use shape::{shape_size, Dimension, PartialShape, Shape};
