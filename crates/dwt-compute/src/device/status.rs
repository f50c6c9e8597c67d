//! Device status codes.
//!
//! Codes follow the OpenCL numbering so a driver-backed context can pass its
//! raw status straight through. [`DeviceCode::translate`] is used for logging.

/// Raw status code reported by a device call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceCode(pub i32);

impl DeviceCode {
    pub const SUCCESS: Self = Self(0);
    pub const DEVICE_NOT_FOUND: Self = Self(-1);
    pub const DEVICE_NOT_AVAILABLE: Self = Self(-2);
    pub const MEM_OBJECT_ALLOCATION_FAILURE: Self = Self(-4);
    pub const OUT_OF_RESOURCES: Self = Self(-5);
    pub const OUT_OF_HOST_MEMORY: Self = Self(-6);
    pub const IMAGE_FORMAT_NOT_SUPPORTED: Self = Self(-10);
    pub const MAP_FAILURE: Self = Self(-12);
    pub const INVALID_VALUE: Self = Self(-30);
    pub const INVALID_CONTEXT: Self = Self(-34);
    pub const INVALID_COMMAND_QUEUE: Self = Self(-36);
    pub const INVALID_HOST_PTR: Self = Self(-37);
    pub const INVALID_MEM_OBJECT: Self = Self(-38);
    pub const INVALID_IMAGE_FORMAT_DESCRIPTOR: Self = Self(-39);
    pub const INVALID_IMAGE_SIZE: Self = Self(-40);
    pub const INVALID_OPERATION: Self = Self(-59);

    /// Raw integer value.
    #[inline]
    pub const fn raw(&self) -> i32 {
        self.0
    }

    /// Whether this code reports success.
    #[inline]
    pub const fn is_success(&self) -> bool {
        self.0 == 0
    }

    /// Human-readable name of the code.
    pub const fn translate(&self) -> &'static str {
        match self.0 {
            0 => "CL_SUCCESS",
            -1 => "CL_DEVICE_NOT_FOUND",
            -2 => "CL_DEVICE_NOT_AVAILABLE",
            -3 => "CL_COMPILER_NOT_AVAILABLE",
            -4 => "CL_MEM_OBJECT_ALLOCATION_FAILURE",
            -5 => "CL_OUT_OF_RESOURCES",
            -6 => "CL_OUT_OF_HOST_MEMORY",
            -7 => "CL_PROFILING_INFO_NOT_AVAILABLE",
            -8 => "CL_MEM_COPY_OVERLAP",
            -9 => "CL_IMAGE_FORMAT_MISMATCH",
            -10 => "CL_IMAGE_FORMAT_NOT_SUPPORTED",
            -11 => "CL_BUILD_PROGRAM_FAILURE",
            -12 => "CL_MAP_FAILURE",
            -30 => "CL_INVALID_VALUE",
            -31 => "CL_INVALID_DEVICE_TYPE",
            -32 => "CL_INVALID_PLATFORM",
            -33 => "CL_INVALID_DEVICE",
            -34 => "CL_INVALID_CONTEXT",
            -35 => "CL_INVALID_QUEUE_PROPERTIES",
            -36 => "CL_INVALID_COMMAND_QUEUE",
            -37 => "CL_INVALID_HOST_PTR",
            -38 => "CL_INVALID_MEM_OBJECT",
            -39 => "CL_INVALID_IMAGE_FORMAT_DESCRIPTOR",
            -40 => "CL_INVALID_IMAGE_SIZE",
            -59 => "CL_INVALID_OPERATION",
            -61 => "CL_INVALID_BUFFER_SIZE",
            -63 => "CL_INVALID_GLOBAL_WORK_SIZE",
            -64 => "CL_INVALID_PROPERTY",
            -65 => "CL_INVALID_IMAGE_DESCRIPTOR",
            _ => "Unknown Error",
        }
    }
}

impl std::fmt::Display for DeviceCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.translate(), self.0)
    }
}

impl std::error::Error for DeviceCode {}

impl From<DeviceCode> for i32 {
    fn from(code: DeviceCode) -> Self {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate() {
        assert_eq!(DeviceCode::SUCCESS.translate(), "CL_SUCCESS");
        assert_eq!(DeviceCode::INVALID_IMAGE_SIZE.translate(), "CL_INVALID_IMAGE_SIZE");
        assert_eq!(DeviceCode(-999).translate(), "Unknown Error");
    }

    #[test]
    fn test_display() {
        let s = DeviceCode::MAP_FAILURE.to_string();
        assert_eq!(s, "CL_MAP_FAILURE (-12)");
        assert!(DeviceCode::SUCCESS.is_success());
        assert!(!DeviceCode::MAP_FAILURE.is_success());
    }
}
