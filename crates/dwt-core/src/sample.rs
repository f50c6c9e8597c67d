//! Host sample element types.
//!
//! [`Sample`] is implemented for the element types the staging buffer can hold:
//! `u16`, `i16`, `f32` and [`half::f16`]. Every sample is [`bytemuck::Pod`], so a
//! slice of samples can be viewed as raw bytes for device transfers.

use bytemuck::Pod;
use half::f16;

/// Element type of host component planes and the staging buffer.
pub trait Sample: Pod + Default + PartialEq + Send + Sync + std::fmt::Debug + 'static {
    /// Short type name for logging.
    const NAME: &'static str;

    /// Convert from f32, saturating for integer types.
    fn from_f32(v: f32) -> Self;
}

impl Sample for u16 {
    const NAME: &'static str = "u16";

    #[inline]
    fn from_f32(v: f32) -> Self {
        v.round().clamp(0.0, u16::MAX as f32) as u16
    }
}

impl Sample for i16 {
    const NAME: &'static str = "i16";

    #[inline]
    fn from_f32(v: f32) -> Self {
        v.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
    }
}

impl Sample for f32 {
    const NAME: &'static str = "f32";

    #[inline]
    fn from_f32(v: f32) -> Self {
        v
    }
}

impl Sample for f16 {
    const NAME: &'static str = "f16";

    #[inline]
    fn from_f32(v: f32) -> Self {
        f16::from_f32(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_integer_saturation() {
        assert_eq!(u16::from_f32(-5.0), 0);
        assert_eq!(u16::from_f32(70000.0), u16::MAX);
        assert_eq!(i16::from_f32(-40000.0), i16::MIN);
        assert_eq!(i16::from_f32(12.4), 12);
    }

    #[test]
    fn test_half_roundtrip() {
        let h = <f16 as Sample>::from_f32(0.5);
        assert_relative_eq!(h.to_f32(), 0.5);
        assert_eq!(<f16 as Sample>::NAME, "f16");
    }

    #[test]
    fn test_pod_bytes() {
        let samples: [u16; 2] = [0x0102, 0x0304];
        let bytes: &[u8] = bytemuck::cast_slice(&samples);
        assert_eq!(bytes.len(), 4);
    }
}
