//! Cache sizing.

const BYTES_PER_MB: usize = 1024 * 1024;

/// Memory budget for the thumbnail cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Limit in bytes, `None` for an unbounded cache
    pub memory_limit: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::from_megabytes(256)
    }
}

impl CacheConfig {
    /// `0` means unbounded, matching the `cache_budget_mb` setting.
    pub fn from_megabytes(megabytes: usize) -> Self {
        if megabytes == 0 {
            Self::unbounded()
        } else {
            Self::with_limit_bytes(megabytes.saturating_mul(BYTES_PER_MB))
        }
    }

    pub fn with_limit_bytes(bytes: usize) -> Self {
        Self {
            memory_limit: Some(bytes),
        }
    }

    pub fn unbounded() -> Self {
        Self { memory_limit: None }
    }

    /// Returns the limit in whole megabytes, `0` when unbounded.
    pub fn memory_limit_mb(&self) -> usize {
        self.memory_limit.map_or(0, |bytes| bytes / BYTES_PER_MB)
    }
}
