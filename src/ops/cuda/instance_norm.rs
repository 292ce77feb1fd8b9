//! CUDA implementation of the instance normalization primitive.

use crate::error::{Error, Result};
use crate::ops::{InstanceNormBuffers, InstanceNormOps, InstanceNormParams, InstanceNormShape};
use crate::runtime::cuda::kernels::{InstanceNormPtrs, launch_instance_norm};
use crate::runtime::cuda::{CudaClient, CudaRuntime, CudaStream};

/// InstanceNormOps implementation for CUDA runtime.
///
/// Kernels are enqueued on `stream` and the call returns without waiting.
impl InstanceNormOps<CudaRuntime> for CudaClient {
    fn instance_norm_fwd(
        &self,
        stream: &CudaStream,
        shape: &InstanceNormShape,
        params: &InstanceNormParams,
        buffers: InstanceNormBuffers<'_>,
    ) -> Result<()> {
        buffers.validate(shape)?;
        if shape.instances()? == 0 || shape.spatial == 0 {
            return Ok(());
        }
        if !shape.dtype.is_enabled() {
            return Err(Error::unsupported_dtype(shape.dtype, "instance_norm_fwd"));
        }

        let ptrs = InstanceNormPtrs {
            input: buffers.input.ptr(),
            output: buffers.output.ptr(),
            scale: buffers.scale.ptr(),
            bias: buffers.bias.ptr(),
            workspace: buffers.workspace.ptr(),
        };

        unsafe {
            launch_instance_norm(
                &self.context,
                stream.driver(),
                self.device.index,
                shape,
                params,
                ptrs,
            )
        }
    }
}
