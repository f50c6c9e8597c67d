//! Device memory lifecycle for wavelet preprocessing.
//!
//! Owns an aligned host staging buffer and the three device images the
//! transform kernels work on, and re-provisions them only when the input
//! geometry changes.
//!
//! # Architecture
//!
//! ```text
//! MemoryManager<T: Sample, D: DeviceContext>
//!     +-- HostBuffer<T>        (aligned staging memory)
//!     +-- input     image      (read-only, u16, device-only)
//!     +-- staging   image      (read-write, aliases HostBuffer)
//!     +-- transform image      (read-write, device-only)
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use dwt_compute::{CpuDevice, DeviceElement, ImageRole, MemoryManager};
//!
//! let device = Arc::new(CpuDevice::new());
//! let mut manager = MemoryManager::<u16, _>::new(device);
//!
//! let gray = vec![7u16; 8 * 8];
//! manager.init(&[&gray[..]], 8, 8, DeviceElement::SignedInt16)?;
//!
//! let mapped = manager.map_image(ImageRole::Staging)?;
//! assert_eq!(mapped.width(), 8);
//! manager.unmap_image(ImageRole::Staging, mapped)?;
//! # Ok::<(), dwt_compute::ComputeError>(())
//! ```

pub mod config;
pub mod device;
pub mod host_buffer;
pub mod manager;
pub mod mapping;

pub use config::{ManagerConfig, format_bytes};
pub use device::{
    CpuDevice, CpuImageHandle, DeviceCode, DeviceContext, DeviceResult, DeviceStats, FaultOp,
    ImageDesc, ImageStorage, MappedRegion,
};
pub use dwt_core::{ChannelLayout, DeviceElement, Dimensions, Sample};
pub use host_buffer::HostBuffer;
pub use manager::{ImageRole, InitOutcome, MemoryManager};
pub use mapping::MappedImage;

use thiserror::Error;

/// Status reported for invalid arguments; no device call is made.
pub const INVALID_ARGUMENT_STATUS: i32 = -1;

/// Device call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOp {
    CreateImage(ImageRole),
    ReleaseImage(ImageRole),
    EnqueueWrite,
    MapImage(ImageRole),
    UnmapImage(ImageRole),
}

impl std::fmt::Display for DeviceOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateImage(role) => write!(f, "create_image({role})"),
            Self::ReleaseImage(role) => write!(f, "release_image({role})"),
            Self::EnqueueWrite => write!(f, "enqueue_write_image"),
            Self::MapImage(role) => write!(f, "map_image({role})"),
            Self::UnmapImage(role) => write!(f, "unmap_image({role})"),
        }
    }
}

/// One image release that failed during teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseFailure {
    pub role: ImageRole,
    pub code: DeviceCode,
}

/// Memory manager errors
#[derive(Error, Debug)]
pub enum ComputeError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Device operation {op} failed: {code}")]
    Device { op: DeviceOp, code: DeviceCode },

    #[error("Teardown incomplete: {} image release(s) failed", .failures.len())]
    Teardown { failures: Vec<ReleaseFailure> },

    #[error(transparent)]
    Core(#[from] dwt_core::Error),
}

impl ComputeError {
    /// Integer status for callers that speak status codes.
    ///
    /// Invalid arguments are [`INVALID_ARGUMENT_STATUS`]; device failures carry
    /// the device's own code.
    pub fn status_code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) | Self::Core(_) => INVALID_ARGUMENT_STATUS,
            Self::Device { code, .. } => code.raw(),
            Self::Teardown { failures } => failures
                .first()
                .map(|f| f.code.raw())
                .unwrap_or(INVALID_ARGUMENT_STATUS),
        }
    }

    /// Device code behind this error, if any.
    pub fn device_code(&self) -> Option<DeviceCode> {
        match self {
            Self::Device { code, .. } => Some(*code),
            Self::Teardown { failures } => failures.first().map(|f| f.code),
            _ => None,
        }
    }
}

pub type ComputeResult<T> = Result<T, ComputeError>;
