//! Size thresholds that drive classification and upload strategy

use serde::{Deserialize, Serialize};

/// Files at or above this size are not mirrored during a regular pass (1 GiB)
pub const LARGE_FILE_THRESHOLD: u64 = 1024 * 1024 * 1024;

/// Content up to this size is buffered and written with a single put (25 MiB)
pub const BUFFER_THRESHOLD: u64 = 25 * 1024 * 1024;

/// Size of every multipart part except the last (8 MiB)
pub const PART_SIZE: u64 = 8 * 1024 * 1024;

/// Effective thresholds for one engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLimits {
    /// Entries with `size >= large_file_threshold` are classified `skipped_large`
    pub large_file_threshold: u64,
    /// Declared sizes `<= buffer_threshold` use the single-put path
    pub buffer_threshold: u64,
    /// Multipart part size
    pub part_size: u64,
}

impl Default for SyncLimits {
    fn default() -> Self {
        Self {
            large_file_threshold: LARGE_FILE_THRESHOLD,
            buffer_threshold: BUFFER_THRESHOLD,
            part_size: PART_SIZE,
        }
    }
}

impl SyncLimits {
    /// Returns true if an entry of this size must be skipped as large
    #[must_use]
    pub fn is_large(&self, size: u64) -> bool {
        size >= self.large_file_threshold
    }

    /// Returns true if content of this declared size is written in one put
    #[must_use]
    pub fn fits_single_put(&self, declared_size: u64) -> bool {
        declared_size <= self.buffer_threshold
    }

    /// Number of parts a multipart upload of `size` bytes produces
    #[must_use]
    pub fn part_count(&self, size: u64) -> u64 {
        if self.part_size == 0 {
            return 0;
        }
        size.div_ceil(self.part_size)
    }
}
