//! # dwt-core
//!
//! Core types for the wavelet preprocessing pipeline.
//!
//! - [`Sample`] - Host element types held in component planes and the staging buffer
//! - [`ChannelLayout`] - Grayscale vs. planar RGB input
//! - [`DeviceElement`], [`ImageFormat`] - Device image element types and formats
//! - [`Dimensions`], [`Region`] - Image size and transfer regions
//!
//! ## Crate Structure
//!
//! ```text
//! dwt-core (this crate)
//!    ^
//!    |
//!    +-- dwt-compute (device context, staging buffer, memory manager)
//!    +-- dwt-cli (driver)
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod dims;
pub mod error;
pub mod format;
pub mod sample;

pub use dims::{Dimensions, Region};
pub use error::{Error, Result};
pub use format::{AccessMode, ChannelLayout, ChannelOrder, ChannelType, DeviceElement, ImageFormat};
pub use sample::Sample;
