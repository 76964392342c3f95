/// File format versions for RustLite (v1.0.0+)
///
/// This module defines version constants for all file formats to ensure
/// forward/backward compatibility and safe upgrades.
/// Cache file format version
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// WAL format version
pub const WAL_FORMAT_VERSION: u16 = 1;

/// Magic numbers for file validation
pub mod magic {
    /// Cache file magic: "OBAC"
    pub const CACHE: [u8; 4] = *b"OBAC";

    /// WAL magic: "RLWL" (RustLite WAL)
    pub const WAL: u32 = 0x524C574C;
}

/// Version compatibility information
pub struct FormatVersion {
    /// Current version of this format
    pub current: u32,
    /// Minimum supported version for reading
    pub min_read: u32,
    /// Minimum supported version for writing
    pub min_write: u32,
}

impl FormatVersion {
    /// Check if a version can be read
    pub fn can_read(&self, version: u32) -> bool {
        version >= self.min_read && version <= self.current
    }

    /// Check if a version can be written
    pub fn can_write(&self, version: u32) -> bool {
        version >= self.min_write && version <= self.current
    }
}

/// Cache file format version info
pub fn cache_version() -> FormatVersion {
    FormatVersion {
        current: CACHE_FORMAT_VERSION,
        min_read: 1,
        min_write: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_compatibility() {
        let v = cache_version();
        assert!(v.can_read(1));
        assert!(v.can_write(1));
        assert!(!v.can_read(0));
        assert!(!v.can_read(999));
    }
}
