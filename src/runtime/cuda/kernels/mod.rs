//! CUDA kernels
//!
//! Kernels are written in CUDA C++ (`instance_norm.cu`) and compiled to PTX
//! by build.rs. The PTX is loaded at runtime and cached per device.

mod instance_norm;
mod loader;

pub use instance_norm::{InstanceNormPtrs, launch_instance_norm};
