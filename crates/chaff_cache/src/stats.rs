// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! Point-in-time cache statistics.

/// A snapshot of cache occupancy and traffic.
///
/// Fields are mutually consistent as of one `stats()` call; the cache does
/// not promise cross-call atomicity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub struct CacheStats {
    /// Total configured capacity in bytes.
    pub total_capacity: u64,
    /// Capacity reserved for personal blocks.
    pub min_personal: u64,
    /// Bytes held by personal blocks.
    pub personal_bytes: u64,
    /// Bytes held by altruistic blocks.
    pub altruistic_bytes: u64,
    /// Number of personal blocks.
    pub personal_count: u64,
    /// Number of altruistic blocks.
    pub altruistic_count: u64,
    /// Unoccupied bytes.
    pub free_bytes: u64,
    /// Current flex-pool ceiling available to altruistic blocks.
    pub flex_room: u64,
    /// Reads that found their block (and passed verification).
    pub hits: u64,
    /// Reads that found nothing usable.
    pub misses: u64,
    /// Entries evicted so far.
    pub evictions: u64,
    /// Reads whose bytes failed content verification; each also counts as a
    /// miss and an eviction.
    pub integrity_failures: u64,
    /// Altruistic stores rejected for lack of flex-pool room.
    pub altruistic_rejections: u64,
}

impl CacheStats {
    /// Bytes occupied by blocks of either origin.
    #[must_use]
    pub fn used_bytes(&self) -> u64 {
        self.personal_bytes + self.altruistic_bytes
    }

    /// Hit rate over all reads so far, `0.0` before any read.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let reads = self.hits + self.misses;
        if reads == 0 {
            return 0.0;
        }
        self.hits as f64 / reads as f64
    }
}
