//! Workspace sizing and forward pass dispatch

use super::PrecisionScales;
use super::context::BoundContext;
use super::format;
use super::params::{DeviceParameters, InstanceNormConfig};
use crate::error::{Error, Result};
use crate::ops::{InstanceNormBuffers, InstanceNormOps, InstanceNormParams, WorkspaceLayout};
use crate::runtime::{DeviceSlice, DeviceSliceMut, Runtime, Stream};
use crate::tensor::TensorDesc;

/// Host-supplied tensors of one forward pass
pub(super) struct EnqueueArgs<'a> {
    pub inputs: &'a [TensorDesc],
    pub outputs: &'a [TensorDesc],
    pub input_buffers: &'a [DeviceSlice],
    pub output_buffers: &'a mut [DeviceSliceMut],
    pub workspace: &'a mut DeviceSliceMut,
}

fn single<'a, T>(items: &'a [T], arg: &'static str) -> Result<&'a T> {
    match items {
        [item] => Ok(item),
        _ => Err(Error::invalid_argument(
            arg,
            format!("expected exactly 1 entry, got {}", items.len()),
        )),
    }
}

/// Scratch bytes for the concrete input shape
///
/// Depends only on batch and channel count.
pub(super) fn workspace_size(config: &InstanceNormConfig, inputs: &[TensorDesc]) -> Result<usize> {
    let input = single(inputs, "inputs")?;
    let shape = format::concrete_shape(input, config.channels())?;
    Ok(WorkspaceLayout::for_shape(&shape)?.size)
}

/// Validate the call, refresh descriptors and enqueue the primitive
pub(super) fn enqueue<R: Runtime>(
    config: &InstanceNormConfig,
    params: &DeviceParameters<R>,
    precision: PrecisionScales,
    context: &mut BoundContext<R>,
    args: EnqueueArgs<'_>,
    stream: &R::Stream,
) -> Result<()>
where
    R::Client: InstanceNormOps<R>,
{
    let input_desc = single(args.inputs, "inputs")?;
    let output_desc = single(args.outputs, "outputs")?;
    if input_desc.dims != output_desc.dims || !input_desc.same_format(output_desc) {
        return Err(Error::invalid_argument(
            "outputs",
            format!(
                "output {:?} {}/{} does not match input {:?} {}/{}",
                output_desc.dims,
                output_desc.dtype,
                output_desc.format,
                input_desc.dims,
                input_desc.dtype,
                input_desc.format
            ),
        ));
    }
    let input = *single(args.input_buffers, "input_buffers")?;
    let output = match args.output_buffers {
        [output] => output,
        other => {
            return Err(Error::invalid_argument(
                "output_buffers",
                format!("expected exactly 1 entry, got {}", other.len()),
            ));
        }
    };

    let client = context.client()?;
    let concrete = format::concrete_shape(input_desc, config.channels())?;
    let shape = context.descriptors_mut().update(&concrete)?;

    tracing::trace!(
        stream = stream.id(),
        batch = shape.batch,
        channels = shape.channels,
        spatial = shape.spatial,
        dtype = %shape.dtype,
        "enqueue instance norm"
    );

    client.instance_norm_fwd(
        stream,
        shape,
        &InstanceNormParams {
            epsilon: config.epsilon(),
            activation: config.activation(),
            input_scale: precision.input,
            output_scale: precision.output,
        },
        InstanceNormBuffers {
            input,
            output,
            scale: params.scale(),
            bias: params.bias(),
            workspace: args.workspace,
        },
    )
}
