//! CPU implementation of the instance normalization primitive.

use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::ops::{
    InstanceNormBuffers, InstanceNormOps, InstanceNormParams, InstanceNormShape, WorkspaceLayout,
};
use crate::runtime::cpu::kernels::{self, StatsScratch};
use crate::runtime::cpu::{CpuClient, CpuRuntime, CpuStream};
use crate::runtime::{DeviceSlice, DeviceSliceMut};

/// Macro for dtype dispatch to typed kernel calls
///
/// F16 is supported when the "f16" feature is enabled; without it, F16
/// returns an `UnsupportedDType` error.
macro_rules! dispatch_dtype {
    ($dtype:expr, $T:ident => $body:block, $error_op:expr) => {
        match $dtype {
            DType::F32 => {
                type $T = f32;
                $body
            }
            DType::F16 => {
                #[cfg(feature = "f16")]
                {
                    type $T = half::f16;
                    $body
                }
                #[cfg(not(feature = "f16"))]
                {
                    return Err(Error::UnsupportedDType {
                        dtype: $dtype,
                        op: $error_op,
                    });
                }
            }
            DType::I8 => {
                type $T = i8;
                $body
            }
        }
    };
}

/// InstanceNormOps implementation for CPU runtime.
///
/// The CPU stream runs work inline, so the output is complete on return.
impl InstanceNormOps<CpuRuntime> for CpuClient {
    fn instance_norm_fwd(
        &self,
        _stream: &CpuStream,
        shape: &InstanceNormShape,
        params: &InstanceNormParams,
        buffers: InstanceNormBuffers<'_>,
    ) -> Result<()> {
        // Rejects overlapping input/output, so the slices below never alias
        buffers.validate(shape)?;
        let instances = shape.instances()?;
        if instances == 0 || shape.spatial == 0 {
            return Ok(());
        }

        let layout = WorkspaceLayout::for_shape(shape)?;
        let sample_len = shape.sample_elems()?;
        let elems = shape.batch * sample_len;

        let scale = unsafe { f32_slice(buffers.scale, shape.channels, "scale")? };
        let bias = unsafe { f32_slice(buffers.bias, shape.channels, "bias")? };
        let scratch = unsafe { split_workspace(buffers.workspace, &layout, instances)? };

        dispatch_dtype!(shape.dtype, T => {
            let input = unsafe { typed_slice::<T>(buffers.input, elems, "input")? };
            let output = unsafe { typed_slice_mut::<T>(buffers.output, elems, "output")? };
            kernels::instance_norm_kernel::<T>(input, output, scale, bias, scratch, shape, params);
        }, "instance_norm_fwd");

        Ok(())
    }
}

fn check_alignment<T>(ptr: u64, arg: &'static str) -> Result<()> {
    if ptr == 0 || ptr as usize % std::mem::align_of::<T>() != 0 {
        return Err(Error::invalid_argument(
            arg,
            format!(
                "pointer {ptr:#x} is null or not aligned to {} bytes",
                std::mem::align_of::<T>()
            ),
        ));
    }
    Ok(())
}

/// # Safety
/// `view` must satisfy the contract of [`DeviceSlice::from_raw`] and hold at
/// least `len` elements of `T` (checked by `InstanceNormBuffers::validate`).
unsafe fn typed_slice<'a, T: Element>(
    view: DeviceSlice,
    len: usize,
    arg: &'static str,
) -> Result<&'a [T]> {
    check_alignment::<T>(view.ptr(), arg)?;
    Ok(unsafe { std::slice::from_raw_parts(view.ptr() as *const T, len) })
}

/// # Safety
/// Same as [`typed_slice`], plus exclusive access for the returned lifetime.
unsafe fn typed_slice_mut<'a, T: Element>(
    view: &mut DeviceSliceMut,
    len: usize,
    arg: &'static str,
) -> Result<&'a mut [T]> {
    check_alignment::<T>(view.ptr(), arg)?;
    Ok(unsafe { std::slice::from_raw_parts_mut(view.ptr() as *mut T, len) })
}

unsafe fn f32_slice<'a>(view: DeviceSlice, len: usize, arg: &'static str) -> Result<&'a [f32]> {
    unsafe { typed_slice::<f32>(view, len, arg) }
}

/// Carve the four statistics segments out of the workspace
///
/// # Safety
/// `workspace` must be valid for `layout.size` bytes with exclusive access.
unsafe fn split_workspace<'a>(
    workspace: &mut DeviceSliceMut,
    layout: &WorkspaceLayout,
    instances: usize,
) -> Result<StatsScratch<'a>> {
    check_alignment::<f32>(workspace.ptr(), "workspace")?;
    let bytes: &'a mut [u8] =
        unsafe { std::slice::from_raw_parts_mut(workspace.ptr() as *mut u8, layout.size) };

    let seg_bytes = instances * std::mem::size_of::<f32>();
    let (scale, rest) = bytes.split_at_mut(layout.bias);
    let (bias, rest) = rest.split_at_mut(layout.mean - layout.bias);
    let (mean, inv_std) = rest.split_at_mut(layout.inv_std - layout.mean);

    let cast = |seg: &'a mut [u8]| -> Result<&'a mut [f32]> {
        bytemuck::try_cast_slice_mut(&mut seg[..seg_bytes])
            .map_err(|e| Error::invalid_argument("workspace", format!("{e:?}")))
    };

    Ok(StatsScratch {
        scale: cast(scale)?,
        bias: cast(bias)?,
        mean: cast(mean)?,
        inv_std: cast(inv_std)?,
    })
}
