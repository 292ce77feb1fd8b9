//! Instance normalization operator
//!
//! Each (sample, channel) slice of an `[N, C, spatial...]` tensor is
//! normalized by its own mean and biased variance, transformed by the
//! per-channel `scale`/`bias`, and optionally passed through a leaky ReLU.

mod codec;
mod context;
mod creator;
mod format;
mod forward;
mod params;

pub use context::ShapeDescriptors;
pub use creator::InstanceNormalizationPluginCreator;
pub use format::SUPPORTED_FORMATS;
pub use params::InstanceNormConfig;

use super::{AuxHandle, DynamicPlugin, Weights};
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::ops::InstanceNormOps;
use crate::runtime::{DeviceSlice, DeviceSliceMut, Runtime};
use crate::tensor::{DimsExprs, DynamicTensorDesc, TensorDesc};
use context::BoundContext;
use params::DeviceParameters;
use std::sync::Arc;

/// Registry name of the operator
pub const INSTANCE_NORM_PLUGIN_NAME: &str = "InstanceNormalization_TRT";
/// Registry version of the operator
pub const INSTANCE_NORM_PLUGIN_VERSION: &str = "1";

/// Quantization factors recorded at configure time
///
/// Identity unless the negotiated dtype is [`DType::I8`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PrecisionScales {
    /// Stored input value to real value
    pub input: f32,
    /// Real output value to stored value (divisor)
    pub output: f32,
}

impl Default for PrecisionScales {
    fn default() -> Self {
        Self {
            input: 1.0,
            output: 1.0,
        }
    }
}

/// Instance normalization operator bound to runtime `R`
///
/// # Example
///
/// ```ignore
/// let mut plugin = InstanceNormalizationPlugin::<CpuRuntime>::new(
///     1e-5, vec![1.0, 2.0], vec![0.0, 1.0], false, 0.0)?;
/// plugin.configure_plugin(&inputs, &outputs)?;
/// plugin.initialize()?;
/// plugin.attach_to_context(&client, None, None);
/// plugin.enqueue(&descs, &descs, &[x], &mut [y], &mut ws, client.stream())?;
/// ```
pub struct InstanceNormalizationPlugin<R: Runtime> {
    config: InstanceNormConfig,
    device: R::Device,
    namespace: String,
    params: Option<DeviceParameters<R>>,
    precision: Option<PrecisionScales>,
    context: Option<BoundContext<R>>,
}

impl<R: Runtime> InstanceNormalizationPlugin<R> {
    /// Create from host vectors on the runtime's default device
    pub fn new(
        epsilon: f32,
        scale: Vec<f32>,
        bias: Vec<f32>,
        relu: bool,
        alpha: f32,
    ) -> Result<Self> {
        Ok(Self::from_config(InstanceNormConfig::new(
            epsilon, scale, bias, relu, alpha,
        )?))
    }

    /// Create from host weight blobs (f32 or f16)
    pub fn from_weights(
        epsilon: f32,
        scale: &Weights,
        bias: &Weights,
        relu: bool,
        alpha: f32,
    ) -> Result<Self> {
        Self::new(epsilon, scale.to_f32_vec()?, bias.to_f32_vec()?, relu, alpha)
    }

    /// Recreate from bytes written by [`DynamicPlugin::serialize`]
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        Ok(Self::from_config(codec::decode(bytes)?))
    }

    /// Wrap a validated configuration
    pub fn from_config(config: InstanceNormConfig) -> Self {
        Self {
            config,
            device: R::default_device(),
            namespace: String::new(),
            params: None,
            precision: None,
            context: None,
        }
    }

    /// Place device parameters on `device` instead of the default one
    ///
    /// Parameters already uploaded elsewhere are released.
    pub fn with_device(mut self, device: R::Device) -> Self {
        if self.params.take().is_some() {
            tracing::debug!("moving instance norm to a new device, parameters released");
        }
        self.device = device;
        self
    }

    /// The operator configuration
    pub fn config(&self) -> &InstanceNormConfig {
        &self.config
    }

    /// Device the parameters live on
    pub fn device(&self) -> &R::Device {
        &self.device
    }

    /// Whether device parameters are allocated
    pub fn is_initialized(&self) -> bool {
        self.params.is_some()
    }

    /// Whether a context is attached
    pub fn is_attached(&self) -> bool {
        self.context.is_some()
    }

    /// Scales recorded by the last configure, if any
    pub fn precision_scales(&self) -> Option<PrecisionScales> {
        self.precision
    }

    /// Descriptors of the attached context
    pub fn descriptors(&self) -> Option<&ShapeDescriptors> {
        self.context.as_ref().map(BoundContext::descriptors)
    }

    /// Auxiliary handle of the attached context
    pub fn aux_handle(&self) -> Option<AuxHandle> {
        self.context.as_ref().and_then(BoundContext::aux)
    }

    /// Allocator of the attached context, if still alive
    pub fn bound_allocator(&self) -> Option<Arc<R::Allocator>> {
        self.context.as_ref().and_then(BoundContext::allocator)
    }

    fn fresh_copy(&self) -> Self {
        let mut copy = Self::from_config(self.config.clone()).with_device(self.device.clone());
        copy.namespace = self.namespace.clone();
        copy
    }
}

impl<R: Runtime> std::fmt::Debug for InstanceNormalizationPlugin<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceNormalizationPlugin")
            .field("config", &self.config)
            .field("namespace", &self.namespace)
            .field("initialized", &self.is_initialized())
            .field("attached", &self.is_attached())
            .field("precision", &self.precision)
            .finish()
    }
}

impl<R: Runtime> DynamicPlugin<R> for InstanceNormalizationPlugin<R>
where
    R::Client: InstanceNormOps<R>,
{
    fn plugin_type(&self) -> &str {
        INSTANCE_NORM_PLUGIN_NAME
    }

    fn plugin_version(&self) -> &str {
        INSTANCE_NORM_PLUGIN_VERSION
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn output_dimensions(&self, output_index: usize, inputs: &[DimsExprs]) -> Result<DimsExprs> {
        format::output_dimensions(output_index, inputs)
    }

    fn output_data_type(&self, index: usize, input_types: &[DType]) -> Result<DType> {
        format::output_data_type(index, input_types)
    }

    fn supports_format_combination(
        &self,
        pos: usize,
        in_out: &[TensorDesc],
        nb_inputs: usize,
        nb_outputs: usize,
    ) -> bool {
        format::supports_format_combination(pos, in_out, nb_inputs, nb_outputs)
    }

    fn configure_plugin(
        &mut self,
        inputs: &[DynamicTensorDesc],
        outputs: &[DynamicTensorDesc],
    ) -> Result<()> {
        let (input, output) = match (inputs, outputs) {
            ([input], [output]) => (&input.desc, &output.desc),
            _ => {
                return Err(Error::invalid_argument(
                    "inputs",
                    format!(
                        "expected 1 input and 1 output, got {} and {}",
                        inputs.len(),
                        outputs.len()
                    ),
                ));
            }
        };
        if !format::is_supported(input.dtype, input.format) {
            return Err(Error::UnsupportedFormat {
                dtype: input.dtype,
                format: input.format,
                op: "configure_plugin",
            });
        }
        if !input.same_format(output) {
            return Err(Error::invalid_argument(
                "outputs",
                format!(
                    "output {}/{} differs from input {}/{}",
                    output.dtype, output.format, input.dtype, input.format
                ),
            ));
        }
        format::check_channels(&input.dims, self.config.channels())?;

        let precision = if input.dtype.is_quantized() {
            for (arg, scale) in [("input scale", input.scale), ("output scale", output.scale)] {
                if !(scale > 0.0) || !scale.is_finite() {
                    return Err(Error::invalid_argument(
                        arg,
                        format!("quantization scale must be positive, got {scale}"),
                    ));
                }
            }
            PrecisionScales {
                input: input.scale,
                output: output.scale,
            }
        } else {
            PrecisionScales::default()
        };
        self.precision = Some(precision);

        if let (Some(ctx), true) = (self.context.as_mut(), input.dims.is_concrete()) {
            let shape = format::concrete_shape(input, self.config.channels())?;
            ctx.descriptors_mut().update(&shape)?;
        }

        tracing::debug!(
            channels = self.config.channels(),
            dtype = %input.dtype,
            format = %input.format,
            input_scale = precision.input,
            output_scale = precision.output,
            "configured instance norm"
        );
        Ok(())
    }

    fn workspace_size(&self, inputs: &[TensorDesc], _outputs: &[TensorDesc]) -> Result<usize> {
        forward::workspace_size(&self.config, inputs)
    }

    fn enqueue(
        &mut self,
        inputs: &[TensorDesc],
        outputs: &[TensorDesc],
        input_buffers: &[DeviceSlice],
        output_buffers: &mut [DeviceSliceMut],
        workspace: &mut DeviceSliceMut,
        stream: &R::Stream,
    ) -> Result<()> {
        let params = self
            .params
            .as_ref()
            .ok_or_else(|| Error::invalid_state("enqueue", "operator is not initialized"))?;
        let precision = self
            .precision
            .ok_or_else(|| Error::invalid_state("enqueue", "operator is not configured"))?;
        let context = self
            .context
            .as_mut()
            .ok_or_else(|| Error::invalid_state("enqueue", "no execution context attached"))?;

        forward::enqueue(
            &self.config,
            params,
            precision,
            context,
            forward::EnqueueArgs {
                inputs,
                outputs,
                input_buffers,
                output_buffers,
                workspace,
            },
            stream,
        )
    }

    fn initialize(&mut self) -> Result<()> {
        if self.params.is_some() {
            tracing::debug!("instance norm already initialized");
            return Ok(());
        }
        let params = DeviceParameters::upload(&self.config, &self.device)?;
        tracing::debug!(
            runtime = R::name(),
            channels = self.config.channels(),
            bytes = params.device_bytes(),
            "initialized instance norm"
        );
        self.params = Some(params);
        Ok(())
    }

    fn terminate(&mut self) {
        match self.params.take() {
            Some(params) => tracing::debug!(
                bytes = params.device_bytes(),
                "terminated instance norm"
            ),
            None => tracing::debug!("terminate on uninitialized instance norm"),
        }
    }

    fn serialization_size(&self) -> usize {
        codec::serialized_size(self.config.channels())
    }

    fn serialize(&self, buffer: &mut [u8]) -> Result<()> {
        codec::encode(&self.config, buffer)
    }

    fn clone_plugin(&self) -> Result<Box<dyn DynamicPlugin<R>>> {
        let mut copy = self.fresh_copy();
        if self.is_initialized() {
            copy.initialize()?;
        }
        Ok(Box::new(copy))
    }

    fn set_plugin_namespace(&mut self, namespace: &str) {
        self.namespace = namespace.to_string();
    }

    fn plugin_namespace(&self) -> &str {
        &self.namespace
    }

    fn attach_to_context(
        &mut self,
        context: &Arc<R::Client>,
        aux: Option<AuxHandle>,
        allocator: Option<&Arc<R::Allocator>>,
    ) {
        if self.context.is_some() {
            tracing::debug!("re-attaching instance norm, previous descriptors dropped");
        }
        self.context = Some(BoundContext::attach(context, aux, allocator));
        tracing::debug!(has_aux = aux.is_some(), "attached instance norm to context");
    }

    fn detach_from_context(&mut self) {
        if self.context.take().is_some() {
            tracing::debug!("detached instance norm from context");
        } else {
            tracing::warn!("detach_from_context without a prior attach");
        }
    }
}
