//! Instance normalization primitive trait and its launch descriptors.

use crate::dtype::{DType, TensorFormat};
use crate::error::{Error, Result};
use crate::runtime::{DeviceSlice, DeviceSliceMut, Runtime};

/// Activation fused after the affine transform
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub enum Activation {
    /// Identity
    #[default]
    None,
    /// `y >= 0 ? y : y * slope`
    LeakyRelu {
        /// Multiplier for negative values
        slope: f32,
    },
}

impl Activation {
    /// Apply to one value
    #[inline]
    pub fn apply(self, y: f32) -> f32 {
        match self {
            Self::None => y,
            Self::LeakyRelu { slope } => {
                if y >= 0.0 {
                    y
                } else {
                    y * slope
                }
            }
        }
    }

    /// Slope handed to kernels (0 when disabled)
    #[inline]
    pub fn slope(self) -> f32 {
        match self {
            Self::None => 0.0,
            Self::LeakyRelu { slope } => slope,
        }
    }

    /// Whether the activation is enabled
    #[inline]
    pub fn is_enabled(self) -> bool {
        matches!(self, Self::LeakyRelu { .. })
    }
}

/// Concrete problem shape seen by the primitive
///
/// `[N, C, spatial...]` collapses to `N * C` instances of `spatial` elements.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstanceNormShape {
    /// Samples in the batch
    pub batch: usize,
    /// Channels per sample
    pub channels: usize,
    /// Product of the spatial extents
    pub spatial: usize,
    /// Element type of input and output
    pub dtype: DType,
    /// Memory layout of input and output
    pub format: TensorFormat,
}

fn overflow(what: &str) -> Error {
    Error::invalid_argument("dims", format!("{what} overflows usize"))
}

impl InstanceNormShape {
    /// Number of (sample, channel) instances
    #[inline]
    pub fn instances(&self) -> Result<usize> {
        self.batch
            .checked_mul(self.channels)
            .ok_or_else(|| overflow("batch * channels"))
    }

    /// Elements occupied by one sample, channel padding included
    #[inline]
    pub fn sample_elems(&self) -> Result<usize> {
        self.format
            .padded_channels(self.channels)
            .checked_mul(self.spatial)
            .ok_or_else(|| overflow("sample size"))
    }

    /// Bytes an input or output tensor of this shape occupies
    pub fn tensor_bytes(&self) -> Result<usize> {
        self.sample_elems()?
            .checked_mul(self.batch)
            .and_then(|elems| elems.checked_mul(self.dtype.size_in_bytes()))
            .ok_or_else(|| overflow("tensor size"))
    }

    /// Element offset of `(c, s)` inside one sample
    ///
    /// In range whenever `c < channels`, `s < spatial` and
    /// [`sample_elems`](Self::sample_elems) succeeds.
    #[inline]
    pub fn offset_in_sample(&self, c: usize, s: usize) -> usize {
        if self.format.is_channel_last() {
            s * self.format.padded_channels(self.channels) + c
        } else {
            c * self.spatial + s
        }
    }
}

/// Byte layout of the scratch workspace
///
/// Four f32 segments of one entry per instance, each aligned to
/// [`WorkspaceLayout::ALIGNMENT`]: replicated scale, replicated bias,
/// mean, inverse standard deviation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WorkspaceLayout {
    /// Offset of the per-instance scale segment
    pub scale: usize,
    /// Offset of the per-instance bias segment
    pub bias: usize,
    /// Offset of the per-instance mean segment
    pub mean: usize,
    /// Offset of the per-instance inverse standard deviation segment
    pub inv_std: usize,
    /// Total bytes
    pub size: usize,
}

impl WorkspaceLayout {
    /// Segment alignment in bytes
    pub const ALIGNMENT: usize = 256;

    /// Layout for `instances` (sample, channel) pairs
    pub fn for_instances(instances: usize) -> Result<Self> {
        let segment = instances
            .checked_mul(std::mem::size_of::<f32>())
            .and_then(|bytes| bytes.checked_next_multiple_of(Self::ALIGNMENT))
            .ok_or_else(|| overflow("workspace segment"))?;
        let size = segment
            .checked_mul(4)
            .ok_or_else(|| overflow("workspace"))?;
        Ok(Self {
            scale: 0,
            bias: segment,
            mean: 2 * segment,
            inv_std: 3 * segment,
            size,
        })
    }

    /// Layout for a concrete shape
    pub fn for_shape(shape: &InstanceNormShape) -> Result<Self> {
        Self::for_instances(shape.instances()?)
    }
}

/// Scalar parameters of one forward pass
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct InstanceNormParams {
    /// Variance stabilizer
    pub epsilon: f32,
    /// Fused activation
    pub activation: Activation,
    /// Multiplier from stored input values to real values
    pub input_scale: f32,
    /// Divisor from real output values to stored values
    pub output_scale: f32,
}

impl InstanceNormParams {
    /// `(input_scale, output_scale)` as applied to `dtype`
    ///
    /// Identity for every dtype but [`DType::I8`].
    #[inline]
    pub fn quantization(&self, dtype: DType) -> (f32, f32) {
        if dtype.is_quantized() {
            (self.input_scale, self.output_scale)
        } else {
            (1.0, 1.0)
        }
    }
}

/// Buffers of one forward pass
///
/// `scale` and `bias` hold `channels` f32 values each.
#[derive(Debug)]
pub struct InstanceNormBuffers<'a> {
    /// Input tensor
    pub input: DeviceSlice,
    /// Output tensor
    pub output: &'a mut DeviceSliceMut,
    /// Per-channel scale
    pub scale: DeviceSlice,
    /// Per-channel bias
    pub bias: DeviceSlice,
    /// Scratch space laid out per [`WorkspaceLayout`]
    pub workspace: &'a mut DeviceSliceMut,
}

impl InstanceNormBuffers<'_> {
    /// Check every buffer is large enough for `shape` and that input and
    /// output do not overlap
    pub fn validate(&self, shape: &InstanceNormShape) -> Result<()> {
        let tensor_bytes = shape.tensor_bytes()?;
        let param_bytes = shape
            .channels
            .checked_mul(std::mem::size_of::<f32>())
            .ok_or_else(|| overflow("parameter size"))?;
        let workspace_bytes = WorkspaceLayout::for_shape(shape)?.size;

        let checks: [(&'static str, usize, usize); 5] = [
            ("input", self.input.len(), tensor_bytes),
            ("output", self.output.len(), tensor_bytes),
            ("scale", self.scale.len(), param_bytes),
            ("bias", self.bias.len(), param_bytes),
            ("workspace", self.workspace.len(), workspace_bytes),
        ];
        for (arg, have, need) in checks {
            if have < need {
                return Err(Error::invalid_argument(
                    arg,
                    format!("buffer holds {have} bytes, {need} required"),
                ));
            }
        }

        let regions: [(&'static str, u64, usize); 3] = [
            ("input", self.input.ptr(), tensor_bytes),
            ("output", self.output.ptr(), tensor_bytes),
            ("workspace", self.workspace.ptr(), workspace_bytes),
        ];
        for (i, &(_, a_ptr, a_len)) in regions.iter().enumerate() {
            for &(arg, b_ptr, b_len) in &regions[i + 1..] {
                if overlaps(a_ptr, a_len, b_ptr, b_len) {
                    return Err(Error::invalid_argument(
                        arg,
                        format!("{arg} overlaps {}", regions[i].0),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn overlaps(a: u64, a_len: usize, b: u64, b_len: usize) -> bool {
    a_len != 0
        && b_len != 0
        && a < b.saturating_add(b_len as u64)
        && b < a.saturating_add(a_len as u64)
}

/// Instance normalization forward primitive
///
/// Implemented by each runtime's client. Work is enqueued on `stream` and the
/// call returns without waiting for it; buffers must stay valid until the
/// stream has been synchronized.
pub trait InstanceNormOps<R: Runtime> {
    /// Normalize every (sample, channel) slice of `buffers.input` by its own
    /// mean and biased variance, apply the per-channel affine transform and
    /// the fused activation, and write `buffers.output`.
    ///
    /// Statistics accumulate in at least 32-bit floating point regardless of
    /// the storage dtype. For [`DType::I8`], inputs are multiplied by
    /// `params.input_scale` before normalization and outputs divided by
    /// `params.output_scale` before rounding.
    ///
    /// Input, output and workspace must not overlap; in-place execution is
    /// rejected with [`Error::InvalidArgument`].
    fn instance_norm_fwd(
        &self,
        stream: &R::Stream,
        shape: &InstanceNormShape,
        params: &InstanceNormParams,
        buffers: InstanceNormBuffers<'_>,
    ) -> Result<()>;
}
