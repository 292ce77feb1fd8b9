//! Tensor descriptions exchanged with the host engine

use super::Dims;
use crate::dtype::{DType, TensorFormat};

/// Description of one operator input or output
///
/// `scale` is the quantization scale for [`DType::I8`] tensors and 1.0 for
/// float tensors.
#[derive(Clone, Debug, PartialEq)]
pub struct TensorDesc {
    /// Logical extents `[N, C, spatial...]`
    pub dims: Dims,
    /// Element type
    pub dtype: DType,
    /// Memory layout
    pub format: TensorFormat,
    /// Quantization scale
    pub scale: f32,
}

impl TensorDesc {
    /// Create a float description with unit scale
    pub fn new(dims: impl Into<Dims>, dtype: DType, format: TensorFormat) -> Self {
        Self {
            dims: dims.into(),
            dtype,
            format,
            scale: 1.0,
        }
    }

    /// Set the quantization scale
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// Whether `other` has the same element type and layout
    #[inline]
    pub fn same_format(&self, other: &Self) -> bool {
        self.dtype == other.dtype && self.format == other.format
    }
}

/// Description used while configuring, with the range a dynamic shape may take
#[derive(Clone, Debug, PartialEq)]
pub struct DynamicTensorDesc {
    /// Negotiated description; dims may contain [`Dims::DYNAMIC`]
    pub desc: TensorDesc,
    /// Smallest extents the tensor will take
    pub min: Dims,
    /// Largest extents the tensor will take
    pub max: Dims,
}

impl DynamicTensorDesc {
    /// Description whose shape is fixed
    pub fn fixed(desc: TensorDesc) -> Self {
        Self {
            min: desc.dims.clone(),
            max: desc.dims.clone(),
            desc,
        }
    }
}
