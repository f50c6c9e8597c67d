//! Host-visible views of mapped device images.

use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::manager::ImageRole;

/// A blocking read mapping of a whole device image.
///
/// Borrowed from the manager, so the image cannot be re-provisioned or torn
/// down while the mapping is alive. Hand it back through
/// [`MemoryManager::unmap_image`](crate::MemoryManager::unmap_image); dropping it
/// leaves the device mapping outstanding until the image is released.
#[derive(Debug)]
pub struct MappedImage<'a> {
    role: ImageRole,
    ptr: NonNull<u8>,
    row_pitch: usize,
    width: usize,
    height: usize,
    bytes_per_pixel: usize,
    _borrow: PhantomData<&'a ()>,
}

impl<'a> MappedImage<'a> {
    pub(crate) fn new(
        role: ImageRole,
        ptr: NonNull<u8>,
        row_pitch: usize,
        width: usize,
        height: usize,
        bytes_per_pixel: usize,
    ) -> Self {
        Self {
            role,
            ptr,
            row_pitch,
            width,
            height,
            bytes_per_pixel,
            _borrow: PhantomData,
        }
    }

    /// Image this mapping belongs to.
    pub fn role(&self) -> ImageRole {
        self.role
    }

    /// First byte of the mapping.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub(crate) fn raw(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Bytes between rows as reported by the device. Do not assume packing.
    pub fn row_pitch(&self) -> usize {
        self.row_pitch
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.bytes_per_pixel
    }

    /// Pixel bytes of row `y`, or `None` past the last row.
    pub fn row(&self, y: usize) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        // SAFETY: the device guarantees `height` rows of `row_pitch` bytes,
        // each holding at least `width * bytes_per_pixel`, while mapped.
        Some(unsafe {
            std::slice::from_raw_parts(
                self.ptr.as_ptr().add(y * self.row_pitch),
                self.width * self.bytes_per_pixel,
            )
        })
    }

    /// Copy all rows into a tightly packed vector.
    pub fn to_packed(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width * self.height * self.bytes_per_pixel);
        for y in 0..self.height {
            if let Some(row) = self.row(y) {
                out.extend_from_slice(row);
            }
        }
        out
    }
}
