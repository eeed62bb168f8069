// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! Cumulative client metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashSet;

use chaff_cache::CacheStats;
use chaff_store::Cid;

/// Shared counters updated by the pipelines with atomic increments.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    bytes_uploaded_original: AtomicU64,
    bytes_stored: AtomicU64,
    blocks_reused: AtomicU64,
    // `bytes_stored` counts each anonymized block once, however many
    // uploads produce it.
    stored_block_cids: DashSet<Cid>,
}

impl Metrics {
    pub(crate) fn record_source_bytes(&self, bytes: u64) {
        self.bytes_uploaded_original
            .fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_anonymized_block(&self, cid: &Cid, size: u64) {
        if self.stored_block_cids.insert(cid.clone()) {
            self.bytes_stored.fetch_add(size, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_randomizer_reuses(&self, count: u64) {
        self.blocks_reused.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(
        &self,
        cache: &CacheStats,
        pool_size: usize,
        avg_reuse_count: f64,
    ) -> MetricsSnapshot {
        MetricsSnapshot {
            bytes_uploaded_original: self.bytes_uploaded_original.load(Ordering::Relaxed),
            bytes_stored: self.bytes_stored.load(Ordering::Relaxed),
            blocks_reused: self.blocks_reused.load(Ordering::Relaxed),
            cache_hits: cache.hits,
            cache_misses: cache.misses,
            personal_blocks: cache.personal_count,
            altruistic_blocks: cache.altruistic_count,
            pool_size: pool_size as u64,
            avg_reuse_count,
        }
    }
}

/// A point-in-time view of the client's cumulative metrics.
///
/// `bytes_stored` counts anonymized block bytes only, once per unique cid;
/// randomizer bytes are not charged to any file because they amortize
/// across every descriptor that references them. Under heavy randomizer
/// reuse, [`storage_efficiency`](Self::storage_efficiency) therefore
/// approaches 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
#[non_exhaustive]
pub struct MetricsSnapshot {
    /// Source bytes accepted by the upload pipeline.
    pub bytes_uploaded_original: u64,
    /// Anonymized block bytes stored, deduplicated by cid.
    pub bytes_stored: u64,
    /// Selections that reused an existing pool randomizer.
    pub blocks_reused: u64,
    /// Cache reads that hit.
    pub cache_hits: u64,
    /// Cache reads that missed.
    pub cache_misses: u64,
    /// Personal blocks resident in the cache.
    pub personal_blocks: u64,
    /// Altruistic blocks resident in the cache.
    pub altruistic_blocks: u64,
    /// Randomizers in the pool.
    pub pool_size: u64,
    /// Mean pool reuse count.
    pub avg_reuse_count: f64,
}

impl MetricsSnapshot {
    /// `bytes_uploaded_original / bytes_stored`, or `0.0` before any
    /// upload.
    #[must_use]
    pub fn storage_efficiency(&self) -> f64 {
        if self.bytes_stored == 0 {
            return 0.0;
        }
        self.bytes_uploaded_original as f64 / self.bytes_stored as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_stored_deduplicates_by_cid() {
        let metrics = Metrics::default();
        let cid = Cid::from("block-a");

        metrics.record_anonymized_block(&cid, 100);
        metrics.record_anonymized_block(&cid, 100);
        metrics.record_anonymized_block(&Cid::from("block-b"), 50);

        let snapshot = metrics.snapshot(&CacheStats::default(), 0, 0.0);
        assert_eq!(snapshot.bytes_stored, 150);
    }

    #[test]
    fn efficiency_is_zero_before_any_upload() {
        let metrics = Metrics::default();
        let snapshot = metrics.snapshot(&CacheStats::default(), 0, 0.0);
        assert!((snapshot.storage_efficiency() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn efficiency_approaches_one_with_reuse() {
        let metrics = Metrics::default();
        metrics.record_source_bytes(1000);
        metrics.record_anonymized_block(&Cid::from("a"), 1000);
        metrics.record_source_bytes(1000);
        metrics.record_anonymized_block(&Cid::from("a"), 1000);

        let snapshot = metrics.snapshot(&CacheStats::default(), 0, 0.0);
        assert!((snapshot.storage_efficiency() - 2.0).abs() < f64::EPSILON);
    }
}
