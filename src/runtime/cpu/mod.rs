//! CPU runtime implementation
//!
//! The CPU runtime uses standard heap allocation as "device" memory and
//! provides the reference implementation of the instance normalization
//! primitive. Kernels run inline on the calling thread; with the `rayon`
//! feature, samples of a batch are processed in parallel.

mod client;
mod device;
pub(crate) mod kernels;
mod runtime;
mod stream;

pub use client::{CpuAllocator, CpuClient};
pub use device::CpuDevice;
pub use runtime::CpuRuntime;
pub use stream::CpuStream;
