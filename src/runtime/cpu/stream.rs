//! CPU stream
//!
//! Work "enqueued" on a CPU stream runs inline on the calling thread, so it
//! has completed by the time the enqueue call returns. That trivially
//! satisfies in-order execution.

use crate::error::Result;
use crate::runtime::Stream;
use std::sync::atomic::{AtomicU64, Ordering};

static STREAM_COUNTER: AtomicU64 = AtomicU64::new(1);

/// In-order host stream
#[derive(Clone, Debug)]
pub struct CpuStream {
    id: u64,
}

impl CpuStream {
    /// Create a stream with a fresh id
    pub fn new() -> Self {
        Self {
            id: STREAM_COUNTER.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl Default for CpuStream {
    fn default() -> Self {
        Self::new()
    }
}

impl Stream for CpuStream {
    fn id(&self) -> u64 {
        self.id
    }

    fn synchronize(&self) -> Result<()> {
        Ok(())
    }
}
