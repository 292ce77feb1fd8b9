//! CPU implementation of operator primitives.

pub mod instance_norm;
