//! Static shape and stride helpers shared by native lowering and providers.

use crate::tensor::{Dimension, PartialShape};

/// Returns static dimensions or maps the first dynamic dimension (or a dynamic rank, reported
/// as `None`) to a caller-defined error.
pub fn static_dims_or_error<E, F>(shape: &PartialShape, mut on_dynamic: F) -> Result<Vec<usize>, E>
where
    F: FnMut(Option<usize>) -> E,
{
    let Some(dims) = shape.dims() else {
        return Err(on_dynamic(None));
    };
    let mut out = Vec::with_capacity(dims.len());
    for (axis, dim) in dims.iter().enumerate() {
        match dim {
            Dimension::Static(value) => out.push(*value),
            Dimension::Dynamic => return Err(on_dynamic(Some(axis))),
        }
    }
    Ok(out)
}

/// Computes `product(dims)` with overflow checking.
pub fn checked_element_count_or_error<E, F>(dims: &[usize], mut on_overflow: F) -> Result<usize, E>
where
    F: FnMut() -> E,
{
    let mut count = 1usize;
    for dim in dims {
        count = count.checked_mul(*dim).ok_or_else(&mut on_overflow)?;
    }
    Ok(count)
}

/// Builds row-major contiguous strides with overflow checking.
pub fn contiguous_strides_or_error<E, F>(
    dims: &[usize],
    mut on_overflow: F,
) -> Result<Vec<usize>, E>
where
    F: FnMut() -> E,
{
    let mut strides = vec![0usize; dims.len()];
    let mut stride = 1usize;
    for axis in (0..dims.len()).rev() {
        strides[axis] = stride;
        stride = stride
            .checked_mul(dims[axis])
            .ok_or_else(&mut on_overflow)?;
    }
    Ok(strides)
}

/// Strides of `input_dims` walked along each output axis of a broadcast whose operand axis `i`
/// lands on output axis `operand_dims[i]`. Replicated axes (and expanded size-1 axes) get 0.
pub fn broadcast_input_strides(
    input_dims: &[usize],
    input_strides: &[usize],
    operand_dims: &[usize],
    output_rank: usize,
) -> Vec<usize> {
    let mut strides = vec![0usize; output_rank];
    for (axis, out_axis) in operand_dims.iter().enumerate() {
        if input_dims[axis] != 1 {
            strides[*out_axis] = input_strides[axis];
        }
    }
    strides
}
