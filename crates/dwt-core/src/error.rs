//! Error types for dwt-core operations.
//!
//! Covers the failure modes that can be detected on the host before any
//! device call is made:
//! - Channel layout selection (unsupported component counts)
//! - Component buffer validation (short planes)
//! - Host allocation (size overflow, bad alignment, out of memory)
//!
//! # Usage
//!
//! ```rust
//! use dwt_core::{Error, Result};
//!
//! fn check_plane(len: usize, pixels: usize) -> Result<()> {
//!     if len < pixels {
//!         return Err(Error::BufferSizeMismatch { expected: pixels, actual: len });
//!     }
//!     Ok(())
//! }
//! assert!(check_plane(3, 4).is_err());
//! ```

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while validating host-side input or allocating host memory.
#[derive(Debug, Error)]
pub enum Error {
    /// Image dimensions are zero or overflow the addressable size.
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Requested width
        width: usize,
        /// Requested height
        height: usize,
    },

    /// Only grayscale (1) and planar RGB (3) inputs are accepted.
    #[error("unsupported channel count: {count} (expected 1 or 3)")]
    UnsupportedChannelCount {
        /// Number of component planes supplied
        count: usize,
    },

    /// A component plane holds fewer samples than the image needs.
    #[error("buffer size mismatch: expected {expected} samples, got {actual}")]
    BufferSizeMismatch {
        /// Samples required (`width * height`)
        expected: usize,
        /// Samples supplied
        actual: usize,
    },

    /// Alignment is zero or not a power of two.
    #[error("invalid alignment: {alignment} bytes")]
    InvalidAlignment {
        /// Offending alignment
        alignment: usize,
    },

    /// Host memory allocation failed.
    ///
    /// Also returned when a request exceeds the configured host budget.
    #[error("failed to allocate {requested} bytes: {reason}")]
    AllocationFailed {
        /// Bytes requested
        requested: usize,
        /// Failure reason
        reason: String,
    },
}

impl Error {
    /// Create an allocation failure with a reason.
    pub fn alloc(requested: usize, reason: impl Into<String>) -> Self {
        Self::AllocationFailed {
            requested,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = Error::UnsupportedChannelCount { count: 2 };
        assert!(err.to_string().contains("2"));

        let err = Error::alloc(4096, "out of memory");
        assert_eq!(err.to_string(), "failed to allocate 4096 bytes: out of memory");
    }
}
