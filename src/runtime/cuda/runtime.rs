//! CUDA runtime implementation

use super::cache::{get_or_create_client, is_cuda_context_valid};
use super::client::{CudaAllocator, CudaClient};
use super::device::CudaDevice;
use super::stream::CudaStream;
use crate::error::{Error, Result};
use crate::runtime::Runtime;
use cudarc::driver::sys::{self, CUresult};

/// CUDA Runtime adapter
///
/// Implements the generic Runtime trait for CUDA backend.
/// Uses cudarc for direct GPU control.
#[derive(Clone, Debug, Default)]
pub struct CudaRuntime;

fn check(result: CUresult, what: &str, bytes: usize) -> Result<()> {
    if result == CUresult::CUDA_SUCCESS {
        Ok(())
    } else {
        Err(Error::Execution(format!(
            "CUDA {what} failed: {bytes} bytes ({result:?})"
        )))
    }
}

impl Runtime for CudaRuntime {
    type Device = CudaDevice;
    type Client = CudaClient;
    type Allocator = CudaAllocator;
    type Stream = CudaStream;

    fn name() -> &'static str {
        "cuda"
    }

    /// Allocate GPU memory synchronously
    fn allocate(size_bytes: usize, device: &Self::Device) -> Result<u64> {
        if size_bytes == 0 {
            return Ok(0);
        }

        let client = get_or_create_client(device)?;
        client.context.bind_to_thread()?;

        let mut ptr: u64 = 0;
        let result = unsafe { sys::cuMemAlloc_v2(&mut ptr, size_bytes) };
        match result {
            CUresult::CUDA_SUCCESS => Ok(ptr),
            CUresult::CUDA_ERROR_OUT_OF_MEMORY => Err(Error::OutOfMemory { size: size_bytes }),
            other => {
                tracing::warn!(bytes = size_bytes, result = ?other, "cuMemAlloc failed");
                Err(Error::OutOfMemory { size: size_bytes })
            }
        }
    }

    fn deallocate(ptr: u64, size_bytes: usize, _device: &Self::Device) {
        if ptr == 0 {
            return;
        }

        unsafe {
            // Context already torn down: the driver has reclaimed the memory
            if !is_cuda_context_valid() {
                return;
            }

            let result = sys::cuMemFree_v2(ptr);
            if result != CUresult::CUDA_SUCCESS {
                tracing::warn!(
                    ptr,
                    bytes = size_bytes,
                    result = ?result,
                    "cuMemFree failed"
                );
            }
        }
    }

    fn copy_to_device(src: &[u8], dst: u64, device: &Self::Device) -> Result<()> {
        if src.is_empty() {
            return Ok(());
        }
        if dst == 0 {
            return Err(Error::invalid_argument("dst", "null device pointer"));
        }

        let client = get_or_create_client(device)?;
        client.context.bind_to_thread()?;
        let result = unsafe {
            sys::cuMemcpyHtoD_v2(dst, src.as_ptr() as *const std::ffi::c_void, src.len())
        };
        check(result, "host-to-device copy", src.len())
    }

    fn copy_from_device(src: u64, dst: &mut [u8], device: &Self::Device) -> Result<()> {
        if dst.is_empty() {
            return Ok(());
        }
        if src == 0 {
            return Err(Error::invalid_argument("src", "null device pointer"));
        }

        let client = get_or_create_client(device)?;
        client.context.bind_to_thread()?;
        let result = unsafe {
            sys::cuMemcpyDtoH_v2(dst.as_mut_ptr() as *mut std::ffi::c_void, src, dst.len())
        };
        check(result, "device-to-host copy", dst.len())
    }

    fn default_device() -> Self::Device {
        CudaDevice::new(0)
    }

    fn default_client(device: &Self::Device) -> Result<Self::Client> {
        get_or_create_client(device)
    }
}

/// Check if CUDA is available on this system
pub fn is_cuda_available() -> bool {
    get_or_create_client(&CudaDevice::new(0)).is_ok()
}
