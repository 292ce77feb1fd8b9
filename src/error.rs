//! Error types for instnorm

use crate::dtype::{DType, TensorFormat};
use thiserror::Error;

/// Result type alias using instnorm's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in operator construction, negotiation and execution
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid argument provided to an operation
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// Serialized state has the wrong size or is truncated
    #[error("Malformed serialized state: expected {expected} bytes, got {got}")]
    Malformed {
        /// Bytes required by the layout
        expected: usize,
        /// Bytes actually available
        got: usize,
    },

    /// (dtype, format) pairing outside the negotiable whitelist
    #[error("Unsupported format {format:?} with dtype {dtype:?} for operation '{op}'")]
    UnsupportedFormat {
        /// Element type of the rejected tensor
        dtype: DType,
        /// Memory layout of the rejected tensor
        format: TensorFormat,
        /// The operation name
        op: &'static str,
    },

    /// Unsupported dtype for an operation
    #[error("Unsupported dtype {dtype:?} for operation '{op}'")]
    UnsupportedDType {
        /// The unsupported dtype
        dtype: DType,
        /// The operation name
        op: &'static str,
    },

    /// Out of memory
    #[error("Out of memory: failed to allocate {size} bytes")]
    OutOfMemory {
        /// Requested size in bytes
        size: usize,
    },

    /// Operation called in a lifecycle state that does not permit it
    #[error("Invalid state for '{op}': {reason}")]
    InvalidState {
        /// The operation name
        op: &'static str,
        /// What was missing
        reason: String,
    },

    /// The normalization primitive failed while enqueueing work
    #[error("Execution failed: {0}")]
    Execution(String),

    /// CUDA-specific error
    #[cfg(feature = "cuda")]
    #[error("CUDA error: {0}")]
    Cuda(#[from] cudarc::driver::DriverError),
}

/// Coarse error classes reported to the host engine
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed configuration, shape or serialized state
    InvalidArgument,
    /// Format/shape combination outside the whitelist
    UnsupportedFormat,
    /// Device allocation failure
    ResourceExhausted,
    /// Failure reported by the normalization primitive
    ExecutionFailure,
}

impl ErrorKind {
    /// Stable non-zero status code for this class (0 means success)
    pub const fn status_code(self) -> i32 {
        match self {
            Self::InvalidArgument => 1,
            Self::UnsupportedFormat => 2,
            Self::ResourceExhausted => 3,
            Self::ExecutionFailure => 4,
        }
    }
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(op: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            op,
            reason: reason.into(),
        }
    }

    /// Create an unsupported dtype error
    pub fn unsupported_dtype(dtype: DType, op: &'static str) -> Self {
        Self::UnsupportedDType { dtype, op }
    }

    /// Classify this error into the host-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } | Self::Malformed { .. } | Self::InvalidState { .. } => {
                ErrorKind::InvalidArgument
            }
            Self::UnsupportedFormat { .. } | Self::UnsupportedDType { .. } => {
                ErrorKind::UnsupportedFormat
            }
            Self::OutOfMemory { .. } => ErrorKind::ResourceExhausted,
            Self::Execution(_) => ErrorKind::ExecutionFailure,
            #[cfg(feature = "cuda")]
            Self::Cuda(_) => ErrorKind::ExecutionFailure,
        }
    }

    /// Integer status code for hosts that expect one
    pub fn status_code(&self) -> i32 {
        self.kind().status_code()
    }
}

/// Convert an enqueue result into the host status code (0 on success)
pub fn status_of(result: &Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => e.status_code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            Error::Malformed {
                expected: 24,
                got: 20
            }
            .kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            Error::OutOfMemory { size: 8 }.kind(),
            ErrorKind::ResourceExhausted
        );
        assert_eq!(
            Error::Execution("boom".into()).kind(),
            ErrorKind::ExecutionFailure
        );
        assert_eq!(
            Error::unsupported_dtype(DType::I8, "weights").kind(),
            ErrorKind::UnsupportedFormat
        );
    }

    #[test]
    fn test_status_codes_are_nonzero_and_distinct() {
        let codes = [
            ErrorKind::InvalidArgument.status_code(),
            ErrorKind::UnsupportedFormat.status_code(),
            ErrorKind::ResourceExhausted.status_code(),
            ErrorKind::ExecutionFailure.status_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            assert_ne!(*a, 0);
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(status_of(&Ok(())), 0);
        assert_eq!(status_of(&Err(Error::OutOfMemory { size: 4 })), 3);
    }
}
