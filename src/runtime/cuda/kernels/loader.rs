//! CUDA kernel loading and caching
//!
//! PTX files are compiled by `build.rs` with nvcc, loaded on first use and
//! cached per device.

use cudarc::driver::safe::{CudaContext, CudaFunction, CudaModule, LaunchConfig};
use cudarc::nvrtc::Ptx;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::dtype::DType;
use crate::error::{Error, Result};

/// Directory containing compiled PTX files (set by build.rs)
const KERNEL_DIR: &str = env!("CUDA_KERNEL_DIR");

/// Threads per block for every instance norm launch (power of two)
pub const BLOCK_SIZE: u32 = 256;

/// Module holding the instance normalization kernels
pub const INSTANCE_NORM_MODULE: &str = "instance_norm";

fn load_ptx(name: &str) -> Ptx {
    Ptx::from_file(format!("{KERNEL_DIR}/{name}.ptx"))
}

/// Cache for loaded CUDA modules, keyed by (device_index, module_name)
static MODULE_CACHE: OnceLock<Mutex<HashMap<(usize, &'static str), Arc<CudaModule>>>> =
    OnceLock::new();

/// Get or load a CUDA module from PTX
pub fn get_or_load_module(
    context: &Arc<CudaContext>,
    device_index: usize,
    module_name: &'static str,
) -> Result<Arc<CudaModule>> {
    let cache = MODULE_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = cache.lock();

    let key = (device_index, module_name);
    if let Some(module) = guard.get(&key) {
        return Ok(module.clone());
    }

    let module = context.load_module(load_ptx(module_name)).map_err(|e| {
        Error::Execution(format!(
            "Failed to load CUDA module '{module_name}': {e:?}. \
             Ensure CUDA kernels were compiled correctly by build.rs."
        ))
    })?;
    tracing::debug!(device = device_index, module = module_name, "loaded CUDA module");

    guard.insert(key, module.clone());
    Ok(module)
}

/// Get a kernel function from a loaded module
pub fn get_kernel_function(module: &Arc<CudaModule>, kernel_name: &str) -> Result<CudaFunction> {
    module.load_function(kernel_name).map_err(|e| {
        Error::Execution(format!("Failed to get kernel '{kernel_name}': {e:?}"))
    })
}

/// Kernel name suffix for a dtype
pub fn dtype_suffix(dtype: DType) -> Result<&'static str> {
    match dtype {
        DType::F32 => Ok("f32"),
        DType::F16 if dtype.is_enabled() => Ok("f16"),
        DType::I8 => Ok("i8"),
        _ => Err(Error::unsupported_dtype(dtype, "cuda kernel")),
    }
}

/// Full kernel name: `{base}_{suffix}`
pub fn kernel_name(base: &str, dtype: DType) -> Result<String> {
    Ok(format!("{base}_{}", dtype_suffix(dtype)?))
}

/// Create a launch configuration from grid, block, and shared memory sizes
#[inline]
pub fn launch_config(
    grid: (u32, u32, u32),
    block: (u32, u32, u32),
    shared_mem: u32,
) -> LaunchConfig {
    LaunchConfig {
        grid_dim: grid,
        block_dim: block,
        shared_mem_bytes: shared_mem,
    }
}
