// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! Cache entries and their metadata.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

/// Who a cached block is held for.
///
/// The origin is fixed at store time; re-storing under the other origin is
/// the only way to move a block between partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Held for the local user: their uploads and downloads.
    Personal,
    /// Held to serve the network; first in line for eviction.
    Altruistic,
}

/// How widely the network replicates a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplicationBucket {
    /// Few known replicas; losing the local copy hurts the network.
    Low,
    /// Typical replication.
    Medium,
    /// Plentiful replicas elsewhere.
    High,
}

/// Network health facts about a cached block.
///
/// Produced by the surrounding network-health collaborator and attached via
/// [`crate::BlockCache::update_health`]; consumed only by the value-based
/// eviction scorer. A block without a hint scores as neutral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthHint {
    /// Replication bucket observed for the block.
    pub replication: ReplicationBucket,
    /// Whether the network classifies the block as high-entropy (i.e. it
    /// plausibly serves as a randomizer for others).
    pub high_entropy: bool,
    /// Recent requests per observation window.
    pub request_rate: u32,
    /// Regions of the network reporting the block missing.
    pub missing_regions: u8,
}

/// A resident cache entry. Access metadata is atomic so reads can update it
/// under the shard's shared lock.
#[derive(Debug)]
pub(crate) struct StoredEntry {
    pub(crate) bytes: Bytes,
    pub(crate) origin: Origin,
    pub(crate) is_randomizer: bool,
    pub(crate) cached_at_ms: u64,
    pub(crate) last_accessed_ms: AtomicU64,
    pub(crate) access_count: AtomicU64,
    pub(crate) health: Option<HealthHint>,
}

impl StoredEntry {
    pub(crate) fn new(bytes: Bytes, origin: Origin, is_randomizer: bool, now_ms: u64) -> Self {
        Self {
            bytes,
            origin,
            is_randomizer,
            cached_at_ms: now_ms,
            last_accessed_ms: AtomicU64::new(now_ms),
            access_count: AtomicU64::new(0),
            health: None,
        }
    }

    pub(crate) fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub(crate) fn touch(&self, now_ms: u64) {
        self.last_accessed_ms.store(now_ms, Ordering::Relaxed);
        self.access_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn last_accessed_ms(&self) -> u64 {
        self.last_accessed_ms.load(Ordering::Relaxed)
    }

    pub(crate) fn access_count(&self) -> u64 {
        self.access_count.load(Ordering::Relaxed)
    }
}
