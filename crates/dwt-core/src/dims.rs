//! Image dimensions and device regions.

use crate::{Error, Result};

/// Width and height of a provisioned image, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
}

impl Dimensions {
    /// Create dimensions without validation.
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Pixel count, failing on zero size or overflow.
    pub fn pixel_count(&self) -> Result<usize> {
        if self.width == 0 || self.height == 0 {
            return Err(self.invalid());
        }
        self.width.checked_mul(self.height).ok_or_else(|| self.invalid())
    }

    /// Whether either side is zero.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Full image region with depth 1.
    #[inline]
    pub const fn region(&self) -> Region {
        Region::full(self.width, self.height)
    }

    fn invalid(&self) -> Error {
        Error::InvalidDimensions {
            width: self.width,
            height: self.height,
        }
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A 3D region (origin + extent) inside a device image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    /// Origin in pixels `(x, y, z)`.
    pub origin: [usize; 3],
    /// Extent in pixels `(width, height, depth)`.
    pub extent: [usize; 3],
}

impl Region {
    /// Whole 2D image: origin `(0,0,0)`, extent `(w,h,1)`.
    pub const fn full(width: usize, height: usize) -> Self {
        Self {
            origin: [0, 0, 0],
            extent: [width, height, 1],
        }
    }

    /// Width of the region.
    #[inline]
    pub const fn width(&self) -> usize {
        self.extent[0]
    }

    /// Height of the region.
    #[inline]
    pub const fn height(&self) -> usize {
        self.extent[1]
    }
}
