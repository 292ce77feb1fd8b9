//! Operation traits.
//!
//! This module contains trait definitions for the operator primitives.
//! Implementations are in the backend-specific modules (cpu/, cuda/).

mod instance_norm;

pub use instance_norm::{
    Activation, InstanceNormBuffers, InstanceNormOps, InstanceNormParams, InstanceNormShape,
    WorkspaceLayout,
};
