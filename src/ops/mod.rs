//! Operator primitives
//!
//! Primitives are defined as traits implemented by each runtime's client,
//! which gives them access to the device and its streams.
//!
//! ```text
//! RuntimeClient<R>
//!   └── implements InstanceNormOps<R>
//!         └── instance_norm_fwd (statistics + normalize + affine + activation)
//! ```

pub mod traits;

#[cfg(feature = "cpu")]
mod cpu;

#[cfg(feature = "cuda")]
mod cuda;

pub use traits::*;
