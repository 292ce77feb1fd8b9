//! Data type and memory-format system for operator tensors
//!
//! This module provides the `DType` enum for element types the operator can
//! consume, and `TensorFormat` describing how `[N, C, spatial...]` tensors are
//! laid out in device memory.

mod element;

pub use element::Element;

use std::fmt;

// ============================================================================
// DType Enum
// ============================================================================

/// Element types understood by the instance normalization operator
///
/// # Discriminant Values (Serialization Stability)
///
/// The discriminant values are **stable**: F32=1, F16=2, I8=13.
/// Existing values are NEVER changed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u8)]
pub enum DType {
    /// 32-bit floating point (most common)
    F32 = 1,
    /// 16-bit floating point (IEEE 754)
    F16 = 2,
    /// 8-bit signed integer, quantized with a per-tensor scale
    I8 = 13,
}

impl DType {
    /// Size of one element in bytes
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F16 => 2,
            Self::I8 => 1,
        }
    }

    /// Returns true if this is a floating point type
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F16)
    }

    /// Returns true if values are stored as quantized integers
    ///
    /// Quantized tensors carry a scale mapping stored values to real values.
    #[inline]
    pub const fn is_quantized(self) -> bool {
        matches!(self, Self::I8)
    }

    /// Returns true if this build can execute kernels for this dtype
    #[inline]
    pub const fn is_enabled(self) -> bool {
        match self {
            Self::F32 | Self::I8 => true,
            Self::F16 => cfg!(feature = "f16"),
        }
    }

    /// Short name used in kernel symbols and logs
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::I8 => "i8",
        }
    }

    /// Get the dtype from its discriminant
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::F32),
            2 => Some(Self::F16),
            13 => Some(Self::I8),
            _ => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

// ============================================================================
// TensorFormat Enum
// ============================================================================

/// Memory layout of a `[N, C, spatial...]` tensor
///
/// Logical dimensions are always given as `[N, C, D?, H?, W]`; the format
/// only changes where each logical element lives in memory.
///
/// | Format  | Element offset of (n, c, s)          | Channel stride |
/// |---------|--------------------------------------|----------------|
/// | Linear  | `(n * C + c) * S + s`                | `S`            |
/// | Hwc     | `(n * S + s) * C + c`                | 1              |
/// | Hwc8    | `(n * S + s) * round_up(C, 8) + c`   | 1              |
/// | Hwc32   | `(n * S + s) * round_up(C, 32) + c`  | 1              |
///
/// `S` is the product of the spatial extents. Padding channels in the
/// vectorized channel-last formats are never read and never written.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u8)]
pub enum TensorFormat {
    /// Row-major NCHW / NCDHW
    Linear = 0,
    /// Channel-last packed NHWC / NDHWC
    Hwc = 1,
    /// Channel-last, channels padded to a multiple of 8
    Hwc8 = 2,
    /// Channel-last, channels padded to a multiple of 32
    Hwc32 = 3,
}

impl TensorFormat {
    /// Channel padding granularity
    #[inline]
    pub const fn channel_alignment(self) -> usize {
        match self {
            Self::Linear | Self::Hwc => 1,
            Self::Hwc8 => 8,
            Self::Hwc32 => 32,
        }
    }

    /// Returns true if channels vary fastest in memory
    #[inline]
    pub const fn is_channel_last(self) -> bool {
        !matches!(self, Self::Linear)
    }

    /// Number of channel slots per spatial position, padding included
    #[inline]
    pub const fn padded_channels(self, channels: usize) -> usize {
        let a = self.channel_alignment();
        channels.div_ceil(a) * a
    }

    /// Number of elements a tensor of `[n, c, spatial]` occupies in this format
    #[inline]
    pub const fn storage_elems(self, n: usize, c: usize, spatial: usize) -> usize {
        n * self.padded_channels(c) * spatial
    }
}

impl fmt::Display for TensorFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Linear => "linear",
            Self::Hwc => "hwc",
            Self::Hwc8 => "hwc8",
            Self::Hwc32 => "hwc32",
        };
        f.write_str(name)
    }
}
