//! Device memory handles
//!
//! `DeviceBuffer` owns an allocation and frees it on drop. `DeviceSlice` and
//! `DeviceSliceMut` are borrowed (pointer, length) views of memory owned by
//! someone else, typically the host engine's I/O tensors and workspace.

use super::Runtime;
use crate::dtype::Element;
use crate::error::Result;
use std::fmt;

/// Owned device allocation, released when dropped
pub struct DeviceBuffer<R: Runtime> {
    /// Raw device pointer (GPU address or CPU ptr cast to u64)
    ptr: u64,
    /// Size in bytes
    len: usize,
    /// Device where memory is allocated
    device: R::Device,
}

impl<R: Runtime> DeviceBuffer<R> {
    /// Allocate `len` bytes on `device`
    pub fn new(len: usize, device: &R::Device) -> Result<Self> {
        let ptr = R::allocate(len, device)?;
        Ok(Self {
            ptr,
            len,
            device: device.clone(),
        })
    }

    /// Allocate and synchronously fill with `data`
    ///
    /// If the transfer fails the allocation is released before returning.
    pub fn from_slice<T: Element>(data: &[T], device: &R::Device) -> Result<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let buffer = Self::new(bytes.len(), device)?;
        R::copy_to_device(bytes, buffer.ptr, device)?;
        Ok(buffer)
    }

    /// Get the raw device pointer
    #[inline]
    pub fn ptr(&self) -> u64 {
        self.ptr
    }

    /// Size in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the device
    #[inline]
    pub fn device(&self) -> &R::Device {
        &self.device
    }

    /// Borrow as a read-only view
    pub fn as_slice(&self) -> DeviceSlice {
        DeviceSlice {
            ptr: self.ptr,
            len: self.len,
        }
    }

    /// Borrow as a writable view
    pub fn as_slice_mut(&mut self) -> DeviceSliceMut {
        DeviceSliceMut {
            ptr: self.ptr,
            len: self.len,
        }
    }

    /// Copy the contents back to the host
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        let mut out = vec![T::zeroed(); self.len / std::mem::size_of::<T>()];
        R::copy_from_device(self.ptr, bytemuck::cast_slice_mut(&mut out), &self.device)?;
        Ok(out)
    }
}

impl<R: Runtime> Drop for DeviceBuffer<R> {
    fn drop(&mut self) {
        R::deallocate(self.ptr, self.len, &self.device);
    }
}

impl<R: Runtime> fmt::Debug for DeviceBuffer<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("ptr", &format_args!("{:#x}", self.ptr))
            .field("len", &self.len)
            .finish()
    }
}

/// Read-only view of caller-owned device memory
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DeviceSlice {
    ptr: u64,
    len: usize,
}

impl DeviceSlice {
    /// Wrap existing device memory
    ///
    /// # Safety
    /// - `ptr` must point to `len` readable bytes of device memory
    /// - The memory must remain valid until all work using it has completed
    pub unsafe fn from_raw(ptr: u64, len: usize) -> Self {
        Self { ptr, len }
    }

    /// Get the raw device pointer
    #[inline]
    pub fn ptr(&self) -> u64 {
        self.ptr
    }

    /// Size in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if view is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Writable view of caller-owned device memory
#[derive(Debug, PartialEq, Eq)]
pub struct DeviceSliceMut {
    ptr: u64,
    len: usize,
}

impl DeviceSliceMut {
    /// Wrap existing device memory
    ///
    /// # Safety
    /// - `ptr` must point to `len` writable bytes of device memory
    /// - No other view may write the same bytes while work using this view
    ///   is in flight
    pub unsafe fn from_raw(ptr: u64, len: usize) -> Self {
        Self { ptr, len }
    }

    /// Get the raw device pointer
    #[inline]
    pub fn ptr(&self) -> u64 {
        self.ptr
    }

    /// Size in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if view is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reborrow as read-only
    pub fn as_const(&self) -> DeviceSlice {
        DeviceSlice {
            ptr: self.ptr,
            len: self.len,
        }
    }
}

#[cfg(all(test, feature = "cpu"))]
mod tests {
    use super::*;
    use crate::runtime::cpu::{CpuDevice, CpuRuntime};

    #[test]
    fn test_buffer_roundtrip() {
        let device = CpuDevice::new();
        let buf = DeviceBuffer::<CpuRuntime>::from_slice(&[1.0f32, 2.0, 3.0], &device).unwrap();
        assert_eq!(buf.len(), 12);
        assert_eq!(buf.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_buffer_released_on_drop() {
        let device = CpuDevice::with_memory_limit(64);
        {
            let _a = DeviceBuffer::<CpuRuntime>::new(48, &device).unwrap();
            assert_eq!(device.bytes_in_use(), 48);
            assert!(DeviceBuffer::<CpuRuntime>::new(32, &device).is_err());
        }
        assert_eq!(device.bytes_in_use(), 0);
        assert!(DeviceBuffer::<CpuRuntime>::new(32, &device).is_ok());
    }
}
