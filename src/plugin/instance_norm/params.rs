//! Operator configuration and its device-resident parameter mirror

use crate::error::{Error, Result};
use crate::ops::Activation;
use crate::runtime::{DeviceBuffer, DeviceSlice, Runtime};

/// Immutable operator configuration
///
/// `scale` and `bias` always hold exactly `channels()` values.
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceNormConfig {
    epsilon: f32,
    relu: bool,
    alpha: f32,
    scale: Vec<f32>,
    bias: Vec<f32>,
}

impl InstanceNormConfig {
    /// Validate and build a configuration
    pub fn new(
        epsilon: f32,
        scale: Vec<f32>,
        bias: Vec<f32>,
        relu: bool,
        alpha: f32,
    ) -> Result<Self> {
        if !(epsilon > 0.0) || !epsilon.is_finite() {
            return Err(Error::invalid_argument(
                "epsilon",
                format!("must be positive and finite, got {epsilon}"),
            ));
        }
        if scale.is_empty() {
            return Err(Error::invalid_argument(
                "scale",
                "channel count must be positive",
            ));
        }
        if scale.len() != bias.len() {
            return Err(Error::invalid_argument(
                "bias",
                format!(
                    "{} bias values for {} scale values",
                    bias.len(),
                    scale.len()
                ),
            ));
        }
        if i32::try_from(scale.len()).is_err() {
            return Err(Error::invalid_argument(
                "scale",
                format!("{} channels exceed the serializable range", scale.len()),
            ));
        }
        Ok(Self {
            epsilon,
            relu,
            alpha,
            scale,
            bias,
        })
    }

    /// Variance stabilizer
    #[inline]
    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    /// Number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.scale.len()
    }

    /// Whether leaky ReLU is fused
    #[inline]
    pub fn relu(&self) -> bool {
        self.relu
    }

    /// Slope for negative values when `relu()` is set
    #[inline]
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Per-channel scale
    #[inline]
    pub fn scale(&self) -> &[f32] {
        &self.scale
    }

    /// Per-channel bias
    #[inline]
    pub fn bias(&self) -> &[f32] {
        &self.bias
    }

    /// Activation seen by the kernel
    pub fn activation(&self) -> Activation {
        if self.relu {
            Activation::LeakyRelu { slope: self.alpha }
        } else {
            Activation::None
        }
    }
}

/// Device copies of scale and bias
///
/// Both buffers exist together or not at all.
#[derive(Debug)]
pub struct DeviceParameters<R: Runtime> {
    scale: DeviceBuffer<R>,
    bias: DeviceBuffer<R>,
}

impl<R: Runtime> DeviceParameters<R> {
    /// Allocate both buffers on `device` and copy the host values over
    ///
    /// A failure on the second buffer drops the first before returning.
    pub fn upload(config: &InstanceNormConfig, device: &R::Device) -> Result<Self> {
        let scale = DeviceBuffer::<R>::from_slice(config.scale(), device)?;
        let bias = match DeviceBuffer::<R>::from_slice(config.bias(), device) {
            Ok(bias) => bias,
            Err(e) => {
                tracing::warn!(
                    bytes = scale.len(),
                    error = %e,
                    "bias upload failed, releasing scale buffer"
                );
                return Err(e);
            }
        };
        Ok(Self { scale, bias })
    }

    /// Device view of the scale values
    pub fn scale(&self) -> DeviceSlice {
        self.scale.as_slice()
    }

    /// Device view of the bias values
    pub fn bias(&self) -> DeviceSlice {
        self.bias.as_slice()
    }

    /// Bytes held on the device
    pub fn device_bytes(&self) -> usize {
        self.scale.len() + self.bias.len()
    }
}
