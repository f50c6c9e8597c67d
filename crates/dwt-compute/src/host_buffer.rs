//! Aligned host staging buffer.
//!
//! One contiguous, zero-initialised allocation whose start address and size are
//! both multiples of the requested alignment. The staging device image aliases
//! this memory, so the buffer must outlive that image.

use std::alloc::{self, Layout};
use std::marker::PhantomData;
use std::ptr::NonNull;

use rayon::prelude::*;

use dwt_core::{ChannelLayout, Error, Result, Sample};

/// Pixel count above which RGB interleaving runs on the rayon pool.
const PARALLEL_FILL_THRESHOLD: usize = 64 * 1024;

/// Aligned, owned host memory holding samples of type `T`.
pub struct HostBuffer<T: Sample> {
    ptr: NonNull<T>,
    len: usize,
    layout: Layout,
    _marker: PhantomData<T>,
}

// SAFETY: HostBuffer owns its allocation exclusively, like Vec<T>.
unsafe impl<T: Sample> Send for HostBuffer<T> {}
unsafe impl<T: Sample> Sync for HostBuffer<T> {}

impl<T: Sample> HostBuffer<T> {
    /// Allocate room for at least `elements` samples and at least `min_bytes`
    /// bytes, rounded up to a multiple of `alignment`.
    pub fn allocate(elements: usize, min_bytes: usize, alignment: usize) -> Result<Self> {
        if alignment == 0 || !alignment.is_power_of_two() {
            return Err(Error::InvalidAlignment { alignment });
        }
        let alignment = alignment.max(std::mem::align_of::<T>());

        let sample_bytes = elements
            .checked_mul(std::mem::size_of::<T>())
            .ok_or_else(|| Error::alloc(usize::MAX, "size overflow"))?;
        let wanted = sample_bytes.max(min_bytes);
        if wanted == 0 {
            return Err(Error::alloc(0, "zero-sized buffer"));
        }
        let size = wanted
            .checked_next_multiple_of(alignment)
            .ok_or_else(|| Error::alloc(wanted, "size overflow"))?;

        let layout = Layout::from_size_align(size, alignment)
            .map_err(|e| Error::alloc(size, e.to_string()))?;

        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw.cast::<T>()).ok_or_else(|| Error::alloc(size, "out of host memory"))?;

        Ok(Self {
            ptr,
            len: size / std::mem::size_of::<T>(),
            layout,
            _marker: PhantomData,
        })
    }

    /// Capacity in samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocation size in bytes (alignment padded).
    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.layout.size()
    }

    /// Alignment of the allocation in bytes.
    #[inline]
    pub fn alignment(&self) -> usize {
        self.layout.align()
    }

    /// Start address.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    pub fn as_slice(&self) -> &[T] {
        // SAFETY: ptr is valid for len initialised (zeroed Pod) samples.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as above, and &mut self guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Whole allocation as bytes.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.as_slice())
    }

    /// Copy planar components into the buffer.
    ///
    /// One component is copied verbatim. Three components are interleaved
    /// per pixel: `buf[3i] = c0[i]`, `buf[3i+1] = c1[i]`, `buf[3i+2] = c2[i]`.
    /// Samples past `pixels * channels` are left as they are.
    pub fn fill_planar(&mut self, components: &[&[T]], pixels: usize) -> Result<ChannelLayout> {
        let layout = ChannelLayout::from_component_count(components.len())?;
        for plane in components {
            if plane.len() < pixels {
                return Err(Error::BufferSizeMismatch {
                    expected: pixels,
                    actual: plane.len(),
                });
            }
        }

        let needed = pixels * layout.host_channels();
        if needed > self.len {
            return Err(Error::BufferSizeMismatch {
                expected: needed,
                actual: self.len,
            });
        }

        let dst = &mut self.as_mut_slice()[..needed];
        match layout {
            ChannelLayout::Gray => dst.copy_from_slice(&components[0][..pixels]),
            ChannelLayout::Rgb => {
                let (r, g, b) = (components[0], components[1], components[2]);
                let interleave = |(i, px): (usize, &mut [T])| {
                    px[0] = r[i];
                    px[1] = g[i];
                    px[2] = b[i];
                };
                if pixels >= PARALLEL_FILL_THRESHOLD {
                    dst.par_chunks_mut(3).enumerate().for_each(interleave);
                } else {
                    dst.chunks_mut(3).enumerate().for_each(interleave);
                }
            }
        }
        Ok(layout)
    }
}

impl<T: Sample> Drop for HostBuffer<T> {
    fn drop(&mut self) {
        // SAFETY: allocated in `allocate` with this exact layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr().cast::<u8>(), self.layout) };
    }
}

impl<T: Sample> std::fmt::Debug for HostBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostBuffer")
            .field("type", &T::NAME)
            .field("len", &self.len)
            .field("size_bytes", &self.size_bytes())
            .field("alignment", &self.alignment())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_and_padding() {
        let buf = HostBuffer::<u16>::allocate(10, 0, 4096).unwrap();
        assert_eq!(buf.as_ptr() as usize % 4096, 0);
        assert_eq!(buf.size_bytes(), 4096);
        assert_eq!(buf.len(), 2048);
        assert!(buf.as_slice().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_min_bytes_wins() {
        let buf = HostBuffer::<u16>::allocate(4, 10_000, 4096).unwrap();
        assert_eq!(buf.size_bytes(), 12_288);
    }

    #[test]
    fn test_bad_alignment() {
        assert!(HostBuffer::<f32>::allocate(4, 0, 3000).is_err());
        assert!(HostBuffer::<f32>::allocate(4, 0, 0).is_err());
        assert!(HostBuffer::<f32>::allocate(0, 0, 64).is_err());
    }

    #[test]
    fn test_fill_gray() {
        let mut buf = HostBuffer::<u16>::allocate(16, 0, 64).unwrap();
        let src: Vec<u16> = (0..16).collect();
        let layout = buf.fill_planar(&[&src[..]], 16).unwrap();
        assert_eq!(layout, ChannelLayout::Gray);
        assert_eq!(&buf.as_slice()[..16], &src[..]);
    }

    #[test]
    fn test_fill_rgb_interleaves() {
        let mut buf = HostBuffer::<f32>::allocate(4 * 4, 0, 64).unwrap();
        let r = [1.0, 2.0, 3.0, 4.0];
        let g = [10.0, 20.0, 30.0, 40.0];
        let b = [100.0, 200.0, 300.0, 400.0];
        buf.fill_planar(&[&r[..], &g[..], &b[..]], 4).unwrap();
        let s = buf.as_slice();
        for i in 0..4 {
            assert_eq!(s[3 * i], r[i]);
            assert_eq!(s[3 * i + 1], g[i]);
            assert_eq!(s[3 * i + 2], b[i]);
        }
        // Tail untouched
        assert!(s[12..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_fill_rgb_parallel_matches() {
        let pixels = PARALLEL_FILL_THRESHOLD + 7;
        let r: Vec<i16> = (0..pixels).map(|i| (i % 100) as i16).collect();
        let g: Vec<i16> = r.iter().map(|v| v + 1).collect();
        let b: Vec<i16> = r.iter().map(|v| v + 2).collect();
        let mut buf = HostBuffer::<i16>::allocate(pixels * 4, 0, 4096).unwrap();
        buf.fill_planar(&[&r[..], &g[..], &b[..]], pixels).unwrap();
        let s = buf.as_slice();
        assert_eq!(s[3 * (pixels - 1)], r[pixels - 1]);
        assert_eq!(s[3 * (pixels - 1) + 2], b[pixels - 1]);
    }

    #[test]
    fn test_fill_rejects_short_plane() {
        let mut buf = HostBuffer::<u16>::allocate(16, 0, 64).unwrap();
        let short = [0u16; 3];
        let err = buf.fill_planar(&[&short[..]], 4).unwrap_err();
        assert!(matches!(err, Error::BufferSizeMismatch { expected: 4, actual: 3 }));
    }

    #[test]
    fn test_fill_rejects_two_planes() {
        let mut buf = HostBuffer::<u16>::allocate(16, 0, 64).unwrap();
        let p = [0u16; 4];
        let err = buf.fill_planar(&[&p[..], &p[..]], 4).unwrap_err();
        assert!(matches!(err, Error::UnsupportedChannelCount { count: 2 }));
    }
}
