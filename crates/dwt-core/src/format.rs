//! Device image formats and host channel layouts.
//!
//! # Types
//!
//! - [`ChannelLayout`] - How host component planes map to device channels
//! - [`ChannelOrder`] - Device channel order (R or RGBA)
//! - [`ChannelType`] - Device channel element type
//! - [`DeviceElement`] - Element type of the read-write pipeline images
//! - [`ImageFormat`] - Order + element type pair handed to the device
//! - [`AccessMode`] - Kernel access mode of a device image
//!
//! # Usage
//!
//! ```rust
//! use dwt_core::format::{ChannelLayout, DeviceElement, ChannelType};
//!
//! let layout = ChannelLayout::from_component_count(3).unwrap();
//! assert_eq!(layout.device_channels(), 4);
//!
//! let element = DeviceElement::from_floating_point(true);
//! assert_eq!(element.channel_type(), ChannelType::Float);
//! ```

use crate::{Error, Result};

/// Host-side channel layout derived from the number of component planes.
///
/// Grayscale maps one plane to a single-channel device image. Planar RGB is
/// interleaved on the host and lands in a four-channel device image; the
/// fourth device channel is never written by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelLayout {
    /// One component plane.
    Gray,
    /// Three component planes (R, G, B).
    Rgb,
}

impl ChannelLayout {
    /// Select the layout for a component count.
    ///
    /// Only 1 and 3 are accepted.
    pub fn from_component_count(count: usize) -> Result<Self> {
        match count {
            1 => Ok(Self::Gray),
            3 => Ok(Self::Rgb),
            _ => Err(Error::UnsupportedChannelCount { count }),
        }
    }

    /// Number of host component planes.
    #[inline]
    pub const fn host_channels(&self) -> usize {
        match self {
            Self::Gray => 1,
            Self::Rgb => 3,
        }
    }

    /// Number of channels in the device image.
    #[inline]
    pub const fn device_channels(&self) -> usize {
        match self {
            Self::Gray => 1,
            Self::Rgb => 4,
        }
    }

    /// Device channel order for this layout.
    #[inline]
    pub const fn channel_order(&self) -> ChannelOrder {
        match self {
            Self::Gray => ChannelOrder::R,
            Self::Rgb => ChannelOrder::Rgba,
        }
    }
}

impl std::fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gray => f.pad("gray"),
            Self::Rgb => f.pad("rgb"),
        }
    }
}

/// Channel order of a device image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelOrder {
    /// Single channel.
    R,
    /// Four channels.
    Rgba,
}

impl ChannelOrder {
    /// Number of channels.
    #[inline]
    pub const fn channels(&self) -> usize {
        match self {
            Self::R => 1,
            Self::Rgba => 4,
        }
    }
}

/// Element type of one device channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelType {
    /// 16-bit unsigned integer (input images).
    UnsignedInt16,
    /// 16-bit signed integer.
    SignedInt16,
    /// 16-bit half-precision float.
    HalfFloat,
    /// 32-bit float.
    Float,
}

impl ChannelType {
    /// Bytes per channel element.
    #[inline]
    pub const fn bytes(&self) -> usize {
        match self {
            Self::UnsignedInt16 | Self::SignedInt16 | Self::HalfFloat => 2,
            Self::Float => 4,
        }
    }

    /// Short name for display.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::UnsignedInt16 => "u16",
            Self::SignedInt16 => "i16",
            Self::HalfFloat => "f16",
            Self::Float => "f32",
        }
    }
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Element type of the staging and transform images.
///
/// Selects between the integer and floating-point transform pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceElement {
    /// 32-bit float pipeline.
    Float32,
    /// 16-bit signed integer pipeline.
    #[default]
    SignedInt16,
    /// 16-bit half-float pipeline.
    Float16,
}

impl DeviceElement {
    /// Map the classic float/integer switch onto an element type.
    #[inline]
    pub const fn from_floating_point(floating_point: bool) -> Self {
        if floating_point {
            Self::Float32
        } else {
            Self::SignedInt16
        }
    }

    /// Device channel type for this element.
    #[inline]
    pub const fn channel_type(&self) -> ChannelType {
        match self {
            Self::Float32 => ChannelType::Float,
            Self::SignedInt16 => ChannelType::SignedInt16,
            Self::Float16 => ChannelType::HalfFloat,
        }
    }

    /// Parse from a short name ("f32", "i16", "f16").
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "f32" | "float" => Some(Self::Float32),
            "i16" | "short" => Some(Self::SignedInt16),
            "f16" | "half" => Some(Self::Float16),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeviceElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.channel_type())
    }
}

/// Device image format: channel order plus channel element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageFormat {
    /// Channel order.
    pub order: ChannelOrder,
    /// Channel element type.
    pub data_type: ChannelType,
}

impl ImageFormat {
    /// Create a format.
    pub const fn new(order: ChannelOrder, data_type: ChannelType) -> Self {
        Self { order, data_type }
    }

    /// Bytes per pixel on the device.
    #[inline]
    pub const fn bytes_per_pixel(&self) -> usize {
        self.order.channels() * self.data_type.bytes()
    }
}

/// Kernel access mode of a device image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Kernels may only read.
    ReadOnly,
    /// Kernels may read and write.
    ReadWrite,
}
