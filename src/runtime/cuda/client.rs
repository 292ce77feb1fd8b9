//! CUDA client implementation
//!
//! `CudaClient` owns a context and a default stream. Operators enqueue on
//! whichever stream the host passes in; the default stream is only used for
//! parameter transfers and by callers without a stream of their own.

use cudarc::driver::safe::CudaContext;
use std::sync::Arc;

use super::CudaRuntime;
use super::device::CudaDevice;
use super::stream::CudaStream;
use crate::error::Result;
use crate::runtime::{DefaultAllocator, Runtime, RuntimeClient, Stream};

/// Allocator for CUDA device memory
pub type CudaAllocator = DefaultAllocator<CudaDevice>;

/// CUDA runtime client
#[derive(Clone)]
pub struct CudaClient {
    /// GPU device index
    pub(crate) device: CudaDevice,

    /// CUDA context for this device
    pub(crate) context: Arc<CudaContext>,

    /// Default stream
    pub(crate) stream: CudaStream,

    /// Allocator for memory management
    pub(crate) allocator: CudaAllocator,
}

impl std::fmt::Debug for CudaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CudaClient")
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl CudaClient {
    /// Create a client: context, default stream and allocator
    pub fn new(device: CudaDevice) -> Result<Self> {
        let context = CudaContext::new(device.index)?;
        context.bind_to_thread()?;
        let stream = CudaStream::from_driver(context.new_stream()?);
        let allocator = DefaultAllocator::new(
            device.clone(),
            CudaRuntime::allocate,
            CudaRuntime::deallocate,
        );
        tracing::debug!(device = device.index, "created CUDA client");
        Ok(Self {
            device,
            context,
            stream,
            allocator,
        })
    }

    /// Get reference to the CUDA context
    #[inline]
    pub fn context(&self) -> &Arc<CudaContext> {
        &self.context
    }

    /// New stream on this client's context
    pub fn new_stream(&self) -> Result<CudaStream> {
        Ok(CudaStream::from_driver(self.context.new_stream()?))
    }
}

impl RuntimeClient<CudaRuntime> for CudaClient {
    fn device(&self) -> &CudaDevice {
        &self.device
    }

    fn stream(&self) -> &CudaStream {
        &self.stream
    }

    fn synchronize(&self) -> Result<()> {
        self.stream.synchronize()
    }

    fn allocator(&self) -> &CudaAllocator {
        &self.allocator
    }
}
