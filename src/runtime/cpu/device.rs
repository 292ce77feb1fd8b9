//! CPU device implementation

use crate::runtime::Device;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Byte accounting shared by all clones of a device
#[derive(Debug)]
struct MemoryUsage {
    in_use: AtomicUsize,
    limit: usize,
}

/// CPU device (the host heap plays the role of device memory)
///
/// A device may carry a memory limit, in which case allocations that would
/// exceed it fail with `OutOfMemory` instead of reaching the system allocator.
#[derive(Clone, Debug)]
pub struct CpuDevice {
    id: usize,
    usage: Arc<MemoryUsage>,
}

impl CpuDevice {
    /// Create a new CPU device without a memory limit
    pub fn new() -> Self {
        Self::with_memory_limit(usize::MAX)
    }

    /// Create a CPU device that refuses to hold more than `limit` bytes
    pub fn with_memory_limit(limit: usize) -> Self {
        Self {
            id: 0,
            usage: Arc::new(MemoryUsage {
                in_use: AtomicUsize::new(0),
                limit,
            }),
        }
    }

    /// Bytes currently allocated on this device
    pub fn bytes_in_use(&self) -> usize {
        self.usage.in_use.load(Ordering::Acquire)
    }

    /// Reserve `size` bytes against the limit; false if it would be exceeded
    pub(super) fn reserve(&self, size: usize) -> bool {
        let limit = self.usage.limit;
        self.usage
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(size).filter(|&total| total <= limit)
            })
            .is_ok()
    }

    /// Return `size` previously reserved bytes
    pub(super) fn release(&self, size: usize) {
        self.usage.in_use.fetch_sub(size, Ordering::AcqRel);
    }
}

impl Default for CpuDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for CpuDevice {
    fn id(&self) -> usize {
        self.id
    }

    fn name(&self) -> String {
        "cpu".to_string()
    }
}
