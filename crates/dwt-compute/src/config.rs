//! Manager configuration and host memory budgeting.
//!
//! # Environment Variables
//!
//! - `DWT_HOST_ALIGN` - Staging buffer alignment in bytes (power of two, default 4096)
//! - `DWT_HONOR_DEVICE_ALIGN` - Raise alignment to the device requirement ("1"/"true", default on)
//! - `DWT_MEM_MB` - Explicit host memory limit in megabytes
//! - `DWT_RAM_MAX` - Explicit host memory limit in bytes

use std::env;
use std::sync::OnceLock;

/// Default staging buffer alignment: one page, suitable for DMA.
pub const DEFAULT_HOST_ALIGNMENT: usize = 4096;

/// Default safety margin - use at most 80% of system memory.
pub const SAFE_MEMORY_FRACTION: f64 = 0.80;

/// Assumed RAM when the platform query fails.
const FALLBACK_SYSTEM_MEMORY: u64 = 8 << 30;

static SYSTEM_MEMORY: OnceLock<u64> = OnceLock::new();

/// Total system RAM in bytes, queried once.
pub fn system_memory() -> u64 {
    *SYSTEM_MEMORY.get_or_init(|| match sys_info::mem_info() {
        Ok(info) => info.total.saturating_mul(1024),
        Err(_) => FALLBACK_SYSTEM_MEMORY,
    })
}

/// Explicit host memory limit from `DWT_MEM_MB` (preferred) or `DWT_RAM_MAX`.
fn memory_override(lookup: &impl Fn(&str) -> Option<String>) -> Option<u64> {
    parse_u64(lookup, "DWT_MEM_MB")
        .map(|mb| mb.saturating_mul(1 << 20))
        .or_else(|| parse_u64(lookup, "DWT_RAM_MAX"))
}

/// Host memory available to staging buffers, considering environment overrides.
///
/// Priority:
/// 1. `DWT_MEM_MB`
/// 2. `DWT_RAM_MAX`
/// 3. 80% of system RAM
pub fn available_memory() -> u64 {
    memory_override(&env_lookup)
        .unwrap_or_else(|| (system_memory() as f64 * SAFE_MEMORY_FRACTION) as u64)
}

/// Staging buffer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Base alignment of the staging buffer in bytes.
    pub host_alignment: usize,
    /// Raise alignment to the device's reported requirement when larger.
    pub honor_device_alignment: bool,
    /// Largest staging buffer in bytes; `None` uses [`available_memory`].
    pub max_host_bytes: Option<u64>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            host_alignment: DEFAULT_HOST_ALIGNMENT,
            honor_device_alignment: true,
            max_host_bytes: None,
        }
    }
}

impl ManagerConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    /// Defaults with overrides read through `lookup`.
    ///
    /// A `DWT_HOST_ALIGN` that is not a power of two is ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(align) = parse_u64(&lookup, "DWT_HOST_ALIGN")
            .and_then(|v| usize::try_from(v).ok())
            .filter(|v| v.is_power_of_two())
        {
            cfg.host_alignment = align;
        }
        if let Some(v) = lookup("DWT_HONOR_DEVICE_ALIGN") {
            let v = v.trim();
            cfg.honor_device_alignment = v == "1" || v.eq_ignore_ascii_case("true");
        }
        cfg.max_host_bytes = memory_override(&lookup);
        cfg
    }

    /// Alignment to allocate with, given the device's requirement.
    ///
    /// Always a power of two and never below the configured base.
    pub fn effective_alignment(&self, device_alignment: usize) -> usize {
        let base = self.host_alignment.max(1).next_power_of_two();
        if self.honor_device_alignment {
            base.max(device_alignment.max(1).next_power_of_two())
        } else {
            base
        }
    }

    /// Staging buffer budget in bytes.
    pub fn host_budget(&self) -> u64 {
        self.max_host_bytes.unwrap_or_else(available_memory)
    }
}

fn env_lookup(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

/// Human-readable byte count, binary units.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut unit = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    match unit {
        0 => format!("{bytes} B"),
        1 => format!("{} KB", bytes >> 10),
        2 => format!("{value:.1} MB"),
        _ => format!("{value:.2} GB"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_system_memory() {
        assert!(system_memory() > 0);
    }

    #[test]
    fn test_from_lookup_defaults() {
        assert_eq!(ManagerConfig::from_lookup(lookup(&[])), ManagerConfig::default());
    }

    #[test]
    fn test_host_align_override() {
        let cfg = ManagerConfig::from_lookup(lookup(&[("DWT_HOST_ALIGN", "16384")]));
        assert_eq!(cfg.host_alignment, 16384);

        let cfg = ManagerConfig::from_lookup(lookup(&[("DWT_HOST_ALIGN", "3000")]));
        assert_eq!(cfg.host_alignment, DEFAULT_HOST_ALIGNMENT);

        let cfg = ManagerConfig::from_lookup(lookup(&[("DWT_HOST_ALIGN", "page")]));
        assert_eq!(cfg.host_alignment, DEFAULT_HOST_ALIGNMENT);
    }

    #[test]
    fn test_honor_device_align_override() {
        let cfg = ManagerConfig::from_lookup(lookup(&[("DWT_HONOR_DEVICE_ALIGN", "0")]));
        assert!(!cfg.honor_device_alignment);
        assert_eq!(cfg.effective_alignment(8192), 4096);

        let cfg = ManagerConfig::from_lookup(lookup(&[("DWT_HONOR_DEVICE_ALIGN", "TRUE")]));
        assert!(cfg.honor_device_alignment);
    }

    #[test]
    fn test_memory_override_priority() {
        let cfg = ManagerConfig::from_lookup(lookup(&[("DWT_MEM_MB", "64"), ("DWT_RAM_MAX", "1000")]));
        assert_eq!(cfg.max_host_bytes, Some(64 * 1024 * 1024));
        assert_eq!(cfg.host_budget(), 64 * 1024 * 1024);

        let cfg = ManagerConfig::from_lookup(lookup(&[("DWT_RAM_MAX", "1000")]));
        assert_eq!(cfg.max_host_bytes, Some(1000));

        let cfg = ManagerConfig::from_lookup(lookup(&[("DWT_MEM_MB", "lots"), ("DWT_RAM_MAX", "1000")]));
        assert_eq!(cfg.max_host_bytes, Some(1000));
    }

    #[test]
    fn test_effective_alignment() {
        let cfg = ManagerConfig::default();
        assert_eq!(cfg.effective_alignment(128), 4096);
        assert_eq!(cfg.effective_alignment(8192), 8192);
        assert_eq!(cfg.effective_alignment(5000), 8192);

        let fixed = ManagerConfig {
            honor_device_alignment: false,
            ..Default::default()
        };
        assert_eq!(fixed.effective_alignment(8192), 4096);
    }

    #[test]
    fn test_explicit_budget() {
        let cfg = ManagerConfig {
            max_host_bytes: Some(1024),
            ..Default::default()
        };
        assert_eq!(cfg.host_budget(), 1024);
    }

    #[test]
    fn test_format_staging_sizes() {
        // 2x2 i16 gray image, one aligned page, 1080p RGBA f32, 16K RGBA f32.
        assert_eq!(format_bytes(8), "8 B");
        assert_eq!(format_bytes(4096), "4 KB");
        assert_eq!(format_bytes(1920 * 1080 * 16), "31.6 MB");
        assert_eq!(format_bytes(16384 * 16384 * 16), "4.00 GB");
    }
}
