//! Tensor shape and description types
//!
//! The operator never owns tensors; it sees them as descriptions (extents,
//! dtype, format, scale) plus caller-owned device buffers.

mod desc;
mod dims;

pub use desc::{DynamicTensorDesc, TensorDesc};
pub use dims::{DimExpr, Dims, DimsExprs};
