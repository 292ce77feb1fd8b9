//! Instance normalization CUDA kernel launchers

use cudarc::driver::PushKernelArg;
use cudarc::driver::safe::{CudaContext, CudaStream};
use std::sync::Arc;

use super::loader::{
    BLOCK_SIZE, INSTANCE_NORM_MODULE, get_kernel_function, get_or_load_module, kernel_name,
    launch_config,
};
use crate::error::{Error, Result};
use crate::ops::{InstanceNormParams, InstanceNormShape, WorkspaceLayout};

/// Upper bound on blocks for the grid-stride apply kernel
const MAX_APPLY_BLOCKS: u32 = 4096;

/// Device pointers of one forward pass
#[derive(Copy, Clone, Debug)]
pub struct InstanceNormPtrs {
    /// Input tensor
    pub input: u64,
    /// Output tensor
    pub output: u64,
    /// Per-channel scale
    pub scale: u64,
    /// Per-channel bias
    pub bias: u64,
    /// Workspace base
    pub workspace: u64,
}

fn to_u32(v: usize, arg: &'static str) -> Result<u32> {
    u32::try_from(v).map_err(|_| Error::invalid_argument(arg, format!("{v} exceeds u32 range")))
}

/// Launch statistics then apply kernels on `stream`
///
/// # Safety
///
/// - All pointers must be valid device memory sized for `shape`
/// - `ptrs.workspace` must hold `WorkspaceLayout::for_shape(shape).size` bytes
/// - The memory must stay valid until `stream` has completed the work
pub unsafe fn launch_instance_norm(
    context: &Arc<CudaContext>,
    stream: &CudaStream,
    device_index: usize,
    shape: &InstanceNormShape,
    params: &InstanceNormParams,
    ptrs: InstanceNormPtrs,
) -> Result<()> {
    let module = get_or_load_module(context, device_index, INSTANCE_NORM_MODULE)?;
    let stats = get_kernel_function(&module, &kernel_name("instance_norm_stats", shape.dtype)?)?;
    let apply = get_kernel_function(&module, &kernel_name("instance_norm_apply", shape.dtype)?)?;

    let layout = WorkspaceLayout::for_shape(shape)?;
    let scale_rep = ptrs.workspace + layout.scale as u64;
    let bias_rep = ptrs.workspace + layout.bias as u64;
    let mean = ptrs.workspace + layout.mean as u64;
    let inv_std = ptrs.workspace + layout.inv_std as u64;

    let instances = to_u32(shape.instances()?, "instances")?;
    let channels = to_u32(shape.channels, "channels")?;
    let padded_c = to_u32(shape.format.padded_channels(shape.channels), "channels")?;
    let spatial = to_u32(shape.spatial, "spatial")?;
    let channel_last = u32::from(shape.format.is_channel_last());
    let relu = u32::from(params.activation.is_enabled());
    let alpha = params.activation.slope();
    let (input_scale, output_scale) = params.quantization(shape.dtype);

    let cfg = launch_config((instances, 1, 1), (BLOCK_SIZE, 1, 1), BLOCK_SIZE * 4);
    let mut builder = stream.launch_builder(&stats);
    builder.arg(&ptrs.input);
    builder.arg(&ptrs.scale);
    builder.arg(&ptrs.bias);
    builder.arg(&scale_rep);
    builder.arg(&bias_rep);
    builder.arg(&mean);
    builder.arg(&inv_std);
    builder.arg(&channels);
    builder.arg(&padded_c);
    builder.arg(&spatial);
    builder.arg(&channel_last);
    builder.arg(&params.epsilon);
    builder.arg(&input_scale);
    unsafe { builder.launch(cfg) }.map_err(|e| {
        Error::Execution(format!("CUDA instance_norm_stats kernel launch failed: {e:?}"))
    })?;

    let total = (instances as usize)
        .checked_mul(shape.spatial)
        .ok_or_else(|| Error::invalid_argument("dims", "instances * spatial overflows usize"))?;
    let blocks = total.div_ceil(BLOCK_SIZE as usize).min(MAX_APPLY_BLOCKS as usize) as u32;
    let cfg = launch_config((blocks, 1, 1), (BLOCK_SIZE, 1, 1), 0);
    let mut builder = stream.launch_builder(&apply);
    builder.arg(&ptrs.input);
    builder.arg(&ptrs.output);
    builder.arg(&scale_rep);
    builder.arg(&bias_rep);
    builder.arg(&mean);
    builder.arg(&inv_std);
    builder.arg(&instances);
    builder.arg(&channels);
    builder.arg(&padded_c);
    builder.arg(&spatial);
    builder.arg(&channel_last);
    builder.arg(&relu);
    builder.arg(&alpha);
    builder.arg(&input_scale);
    builder.arg(&output_scale);
    unsafe { builder.launch(cfg) }.map_err(|e| {
        Error::Execution(format!("CUDA instance_norm_apply kernel launch failed: {e:?}"))
    })?;

    Ok(())
}
