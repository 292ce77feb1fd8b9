//! CPU runtime implementation

use super::client::{CpuAllocator, CpuClient};
use super::device::CpuDevice;
use super::stream::CpuStream;
use crate::error::{Error, Result};
use crate::runtime::Runtime;
use std::alloc::{Layout as AllocLayout, alloc_zeroed, dealloc};

/// Alignment of every CPU allocation
const ALIGN: usize = 64; // AVX-512 alignment

/// CPU compute runtime
///
/// This is the reference runtime that works on any platform.
/// Memory is allocated on the heap using the system allocator.
#[derive(Clone, Debug, Default)]
pub struct CpuRuntime;

impl Runtime for CpuRuntime {
    type Device = CpuDevice;
    type Client = CpuClient;
    type Allocator = CpuAllocator;
    type Stream = CpuStream;

    fn name() -> &'static str {
        "cpu"
    }

    fn allocate(size_bytes: usize, device: &Self::Device) -> Result<u64> {
        if size_bytes == 0 {
            return Ok(0);
        }

        let layout = AllocLayout::from_size_align(size_bytes, ALIGN)
            .map_err(|_| Error::OutOfMemory { size: size_bytes })?;

        if !device.reserve(size_bytes) {
            return Err(Error::OutOfMemory { size: size_bytes });
        }

        let ptr = unsafe { alloc_zeroed(layout) };

        if ptr.is_null() {
            device.release(size_bytes);
            return Err(Error::OutOfMemory { size: size_bytes });
        }

        Ok(ptr as u64)
    }

    fn deallocate(ptr: u64, size_bytes: usize, device: &Self::Device) {
        if ptr == 0 || size_bytes == 0 {
            return;
        }

        // Same layout as allocate, which already validated it
        if let Ok(layout) = AllocLayout::from_size_align(size_bytes, ALIGN) {
            unsafe {
                dealloc(ptr as *mut u8, layout);
            }
            device.release(size_bytes);
        }
    }

    fn copy_to_device(src: &[u8], dst: u64, _device: &Self::Device) -> Result<()> {
        if src.is_empty() {
            return Ok(());
        }
        if dst == 0 {
            return Err(Error::invalid_argument("dst", "null device pointer"));
        }

        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), dst as *mut u8, src.len());
        }
        Ok(())
    }

    fn copy_from_device(src: u64, dst: &mut [u8], _device: &Self::Device) -> Result<()> {
        if dst.is_empty() {
            return Ok(());
        }
        if src == 0 {
            return Err(Error::invalid_argument("src", "null device pointer"));
        }

        unsafe {
            std::ptr::copy_nonoverlapping(src as *const u8, dst.as_mut_ptr(), dst.len());
        }
        Ok(())
    }

    fn default_device() -> Self::Device {
        CpuDevice::new()
    }

    fn default_client(device: &Self::Device) -> Result<Self::Client> {
        Ok(CpuClient::new(device.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_aligned_and_zeroed() {
        let device = CpuDevice::new();
        let ptr = CpuRuntime::allocate(100, &device).unwrap();
        assert_eq!(ptr as usize % ALIGN, 0);
        let mut host = [0xffu8; 100];
        CpuRuntime::copy_from_device(ptr, &mut host, &device).unwrap();
        assert!(host.iter().all(|&b| b == 0));
        CpuRuntime::deallocate(ptr, 100, &device);
        assert_eq!(device.bytes_in_use(), 0);
    }

    #[test]
    fn test_allocate_over_limit_fails() {
        let device = CpuDevice::with_memory_limit(16);
        let err = CpuRuntime::allocate(32, &device).unwrap_err();
        assert!(matches!(err, Error::OutOfMemory { size: 32 }));
        assert_eq!(device.bytes_in_use(), 0);
    }

    #[test]
    fn test_zero_sized_allocation_is_null() {
        let device = CpuDevice::new();
        assert_eq!(CpuRuntime::allocate(0, &device).unwrap(), 0);
        CpuRuntime::deallocate(0, 0, &device);
    }
}
