//! Device context abstraction.
//!
//! The memory manager talks to the accelerator only through [`DeviceContext`].
//! A context is created and owned elsewhere; the manager borrows it through an
//! `Arc` for its whole lifetime.
//!
//! # Architecture
//!
//! ```text
//! MemoryManager<T, D: DeviceContext>
//!     +-- CpuDevice  (host emulation, used by tests and the driver)
//!     +-- ...        (driver-backed contexts)
//! ```

mod cpu;
mod status;

pub use cpu::{CpuDevice, CpuImageHandle, DeviceStats, FaultOp};
pub use status::DeviceCode;

use std::ptr::NonNull;

use dwt_core::{AccessMode, Dimensions, ImageFormat, Region};

/// Result of a raw device call.
pub type DeviceResult<T> = Result<T, DeviceCode>;

/// Description of a 2D device image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// Channel order and element type.
    pub format: ImageFormat,
    /// Kernel access mode.
    pub access: AccessMode,
}

impl ImageDesc {
    pub fn new(dims: Dimensions, format: ImageFormat, access: AccessMode) -> Self {
        Self {
            width: dims.width,
            height: dims.height,
            format,
            access,
        }
    }

    /// Tightly packed row size in bytes.
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.width * self.format.bytes_per_pixel()
    }

    /// Tightly packed image size in bytes.
    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.row_bytes() * self.height
    }
}

/// Where a device image keeps its pixels.
#[derive(Debug, Clone, Copy)]
pub enum ImageStorage<'a> {
    /// Device-owned storage.
    DeviceOnly,
    /// Storage aliases caller-provided host memory.
    ///
    /// The memory stays valid until the image is released; contexts may keep
    /// the address past the call.
    HostAliased(&'a [u8]),
}

impl ImageStorage<'_> {
    /// Whether the image aliases host memory.
    pub fn is_host_aliased(&self) -> bool {
        matches!(self, Self::HostAliased(_))
    }
}

/// Host-visible view returned by a blocking map.
#[derive(Debug, Clone, Copy)]
pub struct MappedRegion {
    /// First byte of the mapped region.
    pub ptr: NonNull<u8>,
    /// Bytes between consecutive rows, as reported by the device.
    pub row_pitch: usize,
}

/// Operations the memory manager needs from an accelerator context.
///
/// Every fallible call returns the raw [`DeviceCode`]; translation and logging
/// happen in the caller.
pub trait DeviceContext: Send + Sync {
    /// Opaque image handle. Released by value.
    type Image: Send;

    /// Device name.
    fn name(&self) -> &str;

    /// Required host memory alignment in bytes.
    fn alignment(&self) -> usize;

    /// Allocate a 2D image.
    fn create_image(&self, desc: &ImageDesc, storage: ImageStorage<'_>) -> DeviceResult<Self::Image>;

    /// Release an image.
    fn release_image(&self, image: Self::Image) -> DeviceResult<()>;

    /// Enqueue a non-blocking write of `data` into `region` of `image`.
    ///
    /// Rows in `data` are tightly packed. The write completes asynchronously;
    /// a blocking map or [`finish`](Self::finish) observes it.
    fn enqueue_write_image(&self, image: &Self::Image, region: Region, data: &[u8]) -> DeviceResult<()>;

    /// Map `region` of `image` for host reads, blocking until prior queued
    /// work on it completes.
    fn map_image(&self, image: &Self::Image, region: Region) -> DeviceResult<MappedRegion>;

    /// Release a mapping obtained from [`map_image`](Self::map_image).
    fn unmap_image(&self, image: &Self::Image, ptr: NonNull<u8>) -> DeviceResult<()>;

    /// Block until all queued work completes.
    fn finish(&self) -> DeviceResult<()>;
}
