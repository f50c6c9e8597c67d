//! CLI command implementations

pub mod info;
pub mod run;

use dwt_core::Sample;
use rayon::prelude::*;

/// Parse a `WxH` size.
pub fn parse_size(s: &str) -> Result<(usize, usize), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got '{s}'"))?;
    let w = w.trim().parse().map_err(|_| format!("bad width in '{s}'"))?;
    let h = h.trim().parse().map_err(|_| format!("bad height in '{s}'"))?;
    Ok((w, h))
}

/// Synthetic planar frame: a diagonal ramp per channel, shifted by `frame`.
pub fn test_pattern<T: Sample>(width: usize, height: usize, channels: usize, frame: usize) -> Vec<Vec<T>> {
    (0..channels)
        .map(|c| {
            (0..width * height)
                .into_par_iter()
                .map(|i| {
                    let (x, y) = (i % width.max(1), i / width.max(1));
                    let v = (x + y + c * 37 + frame * 11) % 256;
                    T::from_f32(v as f32)
                })
                .collect()
        })
        .collect()
}

/// FNV-1a over raw bytes.
pub fn checksum(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |h, &b| {
        (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
    })
}
