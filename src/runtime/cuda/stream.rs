//! CUDA stream wrapper

use crate::error::Result;
use crate::runtime::Stream;
use cudarc::driver::safe::CudaStream as DriverStream;
use std::sync::Arc;

/// In-order CUDA work queue
///
/// Wraps a `cudarc` stream so the host engine can hand in its own.
#[derive(Clone, Debug)]
pub struct CudaStream {
    inner: Arc<DriverStream>,
}

impl CudaStream {
    /// Wrap an existing driver stream
    pub fn from_driver(inner: Arc<DriverStream>) -> Self {
        Self { inner }
    }

    /// The underlying driver stream
    #[inline]
    pub fn driver(&self) -> &Arc<DriverStream> {
        &self.inner
    }
}

impl Stream for CudaStream {
    fn id(&self) -> u64 {
        self.inner.cu_stream() as u64
    }

    fn synchronize(&self) -> Result<()> {
        Ok(self.inner.synchronize()?)
    }
}
