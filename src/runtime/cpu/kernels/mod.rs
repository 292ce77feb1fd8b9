//! CPU compute kernels
//!
//! Kernels operate on host slices; the op layer is responsible for turning
//! device pointers into correctly sized slices.

mod norm;

pub use norm::{StatsScratch, instance_norm_kernel};
