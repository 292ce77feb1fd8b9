//! Runtime backends for operator execution
//!
//! This module defines the `Runtime` trait and provides implementations
//! for the host reference backend (CPU) and NVIDIA GPUs (CUDA).
//!
//! # Architecture
//!
//! ```text
//! Runtime (backend identity, raw allocate / copy / free primitives)
//! ├── Device (identifies a specific GPU/CPU)
//! ├── Client (execution context: device, allocator, default stream)
//! ├── Allocator (memory management handed to operators on attach)
//! └── Stream (in-order work queue that kernels are enqueued on)
//! ```

mod allocator;
mod buffer;

#[cfg(feature = "cpu")]
pub mod cpu;

#[cfg(feature = "cuda")]
pub mod cuda;

pub use allocator::{Allocator, DefaultAllocator};
pub use buffer::{DeviceBuffer, DeviceSlice, DeviceSliceMut};

use crate::error::Result;

/// Core trait for compute backends
///
/// `Runtime` abstracts over different compute devices (CPU, GPU, etc.).
/// It uses static dispatch via generics for zero-cost abstraction.
///
/// # Example
///
/// ```ignore
/// use instnorm::runtime::{Runtime, cpu::CpuRuntime};
///
/// let device = CpuRuntime::default_device();
/// let ptr = CpuRuntime::allocate(1024, &device)?;
/// // ... use memory ...
/// CpuRuntime::deallocate(ptr, 1024, &device);
/// ```
pub trait Runtime: Clone + Send + Sync + 'static {
    /// Device identifier type
    type Device: Device;

    /// Client for dispatching operations
    type Client: RuntimeClient<Self>;

    /// Memory allocator type
    type Allocator: Allocator;

    /// In-order execution queue
    type Stream: Stream;

    /// Human-readable name of this runtime
    fn name() -> &'static str;

    /// Allocate device memory
    ///
    /// Returns a device pointer (u64) that can be used for operations.
    /// Returns `Err(OutOfMemory)` if allocation fails.
    fn allocate(size_bytes: usize, device: &Self::Device) -> Result<u64>;

    /// Deallocate device memory
    fn deallocate(ptr: u64, size_bytes: usize, device: &Self::Device);

    /// Copy data from host to device, returning once the copy is complete
    fn copy_to_device(src: &[u8], dst: u64, device: &Self::Device) -> Result<()>;

    /// Copy data from device to host, returning once the copy is complete
    fn copy_from_device(src: u64, dst: &mut [u8], device: &Self::Device) -> Result<()>;

    /// Get the default device
    fn default_device() -> Self::Device;

    /// Get the default client for a device
    fn default_client(device: &Self::Device) -> Result<Self::Client>;
}

/// Trait for device identification
pub trait Device: Clone + Send + Sync + 'static {
    /// Unique identifier for this device
    fn id(&self) -> usize;

    /// Check if two devices are the same
    fn is_same(&self, other: &Self) -> bool {
        self.id() == other.id()
    }

    /// Human-readable name
    fn name(&self) -> String {
        format!("Device({})", self.id())
    }
}

/// Trait for runtime clients (execution contexts) that own a device and a stream
pub trait RuntimeClient<R: Runtime>: Send + Sync {
    /// Get the device this client operates on
    fn device(&self) -> &R::Device;

    /// Stream used when the caller does not supply one
    fn stream(&self) -> &R::Stream;

    /// Synchronize: wait for all pending operations to complete
    fn synchronize(&self) -> Result<()>;

    /// Get the allocator for this client
    fn allocator(&self) -> &R::Allocator;
}

/// In-order queue of device work
///
/// Work enqueued on one stream executes in program order. Nothing is
/// guaranteed across streams.
pub trait Stream: Send + Sync {
    /// Identifier, unique within the process for live streams
    fn id(&self) -> u64;

    /// Block until all work enqueued so far has completed
    fn synchronize(&self) -> Result<()>;
}
