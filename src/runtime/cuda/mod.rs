//! CUDA runtime implementation
//!
//! Device memory is managed with the driver API through `cudarc`. The
//! instance normalization kernels live in `kernels/instance_norm.cu` and are
//! compiled to PTX by build.rs; launches are asynchronous on the stream the
//! caller supplies.

mod cache;
mod client;
mod device;
pub(crate) mod kernels;
mod runtime;
mod stream;

pub use client::{CudaAllocator, CudaClient};
pub use device::CudaDevice;
pub use runtime::{CudaRuntime, is_cuda_available};
pub use stream::CudaStream;
