//! # instnorm
//!
//! **Instance normalization operator for accelerator execution engines.**
//!
//! instnorm provides an instance normalization operator that plugs into a
//! host tensor-execution engine: each (sample, channel) slice of an
//! `[N, C, spatial...]` tensor is normalized by its own mean and variance,
//! transformed by a learned per-channel scale and bias, and optionally passed
//! through a fused leaky ReLU.
//!
//! ## Features
//!
//! - **Host plugin interface**: shape/format negotiation, configure,
//!   initialize/terminate, attach/detach, enqueue, clone
//! - **Bit-exact serialization** of the operator configuration
//! - **Registry** of creators keyed by namespace, name and version
//! - **Multiple dtypes**: f32, f16 and int8 with quantization scales
//! - **Layouts**: linear and channel-last (packed, 8- and 32-channel padded)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use instnorm::prelude::*;
//!
//! let registry = PluginRegistry::<CpuRuntime>::new();
//! register_builtin_plugins(&registry, "")?;
//! let creator = registry
//!     .get_creator(INSTANCE_NORM_PLUGIN_NAME, INSTANCE_NORM_PLUGIN_VERSION, "")
//!     .expect("registered");
//! let mut plugin = creator.create_plugin("norm0", &fields)?;
//! plugin.configure_plugin(&inputs, &outputs)?;
//! plugin.initialize()?;
//! ```
//!
//! ## Feature Flags
//!
//! - `cpu` (default): host reference backend
//! - `cuda`: NVIDIA CUDA backend
//! - `rayon` (default): multi-threaded CPU kernel (no effect without `cpu`)
//! - `f16` (default): half-precision tensors and weights

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod dtype;
pub mod error;
pub mod ops;
pub mod plugin;
pub mod runtime;
pub mod tensor;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::dtype::{DType, TensorFormat};
    pub use crate::error::{Error, ErrorKind, Result, status_of};
    pub use crate::plugin::{
        DynamicPlugin, INSTANCE_NORM_PLUGIN_NAME, INSTANCE_NORM_PLUGIN_VERSION,
        InstanceNormalizationPlugin, PluginCreator, PluginField, PluginFieldCollection,
        PluginFieldData, PluginRegistry, Weights, register_builtin_plugins,
    };
    pub use crate::runtime::{
        Device, DeviceBuffer, DeviceSlice, DeviceSliceMut, Runtime, RuntimeClient, Stream,
    };
    pub use crate::tensor::{DimExpr, Dims, DimsExprs, DynamicTensorDesc, TensorDesc};

    #[cfg(feature = "cpu")]
    pub use crate::runtime::cpu::CpuRuntime;

    #[cfg(feature = "cuda")]
    pub use crate::runtime::cuda::CudaRuntime;
}

/// Default runtime based on enabled features
///
/// - With `cuda` feature: `CudaRuntime`
/// - Otherwise: `CpuRuntime`
#[cfg(feature = "cuda")]
pub type DefaultRuntime = runtime::cuda::CudaRuntime;

/// Default runtime based on enabled features
#[cfg(all(feature = "cpu", not(feature = "cuda")))]
pub type DefaultRuntime = runtime::cpu::CpuRuntime;
