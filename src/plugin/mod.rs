//! Host engine plugin interface
//!
//! The host engine drives every operator through [`DynamicPlugin`]: it
//! negotiates shapes and formats at build time, then runs the lifecycle
//!
//! ```text
//! construct → configure_plugin → initialize → attach_to_context
//!           → enqueue* → detach_from_context → terminate → drop
//! ```
//!
//! Operators are found by name through a [`PluginRegistry`] of
//! [`PluginCreator`]s.

pub mod fields;
mod instance_norm;
mod registry;

pub use fields::{
    FieldSpec, PluginField, PluginFieldCollection, PluginFieldData, PluginFieldType, Weights,
};
pub use instance_norm::{
    INSTANCE_NORM_PLUGIN_NAME, INSTANCE_NORM_PLUGIN_VERSION, InstanceNormConfig,
    InstanceNormalizationPlugin, InstanceNormalizationPluginCreator, PrecisionScales,
    ShapeDescriptors, SUPPORTED_FORMATS,
};
pub use registry::{PluginCreator, PluginRegistry, register_builtin_plugins};

use crate::dtype::DType;
use crate::error::Result;
use crate::runtime::{DeviceSlice, DeviceSliceMut, Runtime};
use crate::tensor::{DimsExprs, DynamicTensorDesc, TensorDesc};
use std::sync::Arc;

/// Opaque handle to an auxiliary linear-algebra context owned by the host
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct AuxHandle(pub u64);

/// Operator as seen by the host engine
///
/// Calls on one instance are serialized by the host; implementations do no
/// internal locking. Dropping the box is the destroy step.
pub trait DynamicPlugin<R: Runtime>: Send {
    /// Stable type name used for registry lookup
    fn plugin_type(&self) -> &str;

    /// Version string used for registry lookup
    fn plugin_version(&self) -> &str;

    /// Number of output tensors
    fn num_outputs(&self) -> usize;

    /// Output shape for `output_index`, given symbolic input shapes
    fn output_dimensions(&self, output_index: usize, inputs: &[DimsExprs]) -> Result<DimsExprs>;

    /// Output element type for `index`, given the input element types
    fn output_data_type(&self, index: usize, input_types: &[DType]) -> Result<DType>;

    /// Whether position `pos` of `in_out` (inputs then outputs) may take its
    /// proposed dtype and format, given positions `0..pos`
    fn supports_format_combination(
        &self,
        pos: usize,
        in_out: &[TensorDesc],
        nb_inputs: usize,
        nb_outputs: usize,
    ) -> bool;

    /// Record the negotiated formats and shape ranges
    fn configure_plugin(
        &mut self,
        inputs: &[DynamicTensorDesc],
        outputs: &[DynamicTensorDesc],
    ) -> Result<()>;

    /// Scratch bytes `enqueue` needs for these concrete shapes
    fn workspace_size(&self, inputs: &[TensorDesc], outputs: &[TensorDesc]) -> Result<usize>;

    /// Enqueue one forward pass on `stream` and return without waiting
    #[allow(clippy::too_many_arguments)]
    fn enqueue(
        &mut self,
        inputs: &[TensorDesc],
        outputs: &[TensorDesc],
        input_buffers: &[DeviceSlice],
        output_buffers: &mut [DeviceSliceMut],
        workspace: &mut DeviceSliceMut,
        stream: &R::Stream,
    ) -> Result<()>;

    /// Acquire device resources
    fn initialize(&mut self) -> Result<()>;

    /// Release device resources; repeated calls do nothing
    fn terminate(&mut self);

    /// Exact byte count of [`serialize`](Self::serialize)
    fn serialization_size(&self) -> usize;

    /// Write the configuration to `buffer`
    fn serialize(&self, buffer: &mut [u8]) -> Result<()>;

    /// Independent copy of the configuration
    fn clone_plugin(&self) -> Result<Box<dyn DynamicPlugin<R>>>;

    /// Set the namespace used to disambiguate same-named operators
    fn set_plugin_namespace(&mut self, namespace: &str);

    /// Current namespace
    fn plugin_namespace(&self) -> &str;

    /// Record host execution handles; none of them become owned
    fn attach_to_context(
        &mut self,
        context: &Arc<R::Client>,
        aux: Option<AuxHandle>,
        allocator: Option<&Arc<R::Allocator>>,
    );

    /// Forget the handles recorded by `attach_to_context`
    fn detach_from_context(&mut self);
}
