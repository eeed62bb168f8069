// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! The partitioned local block cache.
//!
//! Cache capacity is shared between two kinds of residents: *personal*
//! blocks the local user put there (their own uploads and downloads) and
//! *altruistic* blocks held to serve the rest of the network. The partition
//! rules keep altruism from ever crowding out the owner:
//!
//! - a configured floor of capacity ([`CacheBuilder::min_personal`]) is
//!   reserved for personal blocks at all times;
//! - altruistic blocks live in the *flex pool* (whatever capacity the
//!   personal set is not using above the floor) and are the first to go
//!   when space is needed;
//! - a personal store never fails for capacity reasons while any altruistic
//!   byte could be evicted instead.
//!
//! Which altruistic block goes first is the scorer's call: plain LRU/LFU/age
//! strategies are available, and the default [`EvictionStrategy::ValueBased`]
//! folds in network health hints so that rare, high-entropy, in-demand
//! blocks outlive common ones.
//!
//! Reads are verified: `get` recomputes the content id of the bytes it is
//! about to return and converts any mismatch into an eviction plus a miss,
//! so a corrupt cache can degrade performance but never correctness.

mod builder;
mod cache;
mod entry;
mod score;
mod stats;

pub use builder::CacheBuilder;
pub use cache::{BlockCache, Verifier};
pub use entry::{HealthHint, Origin, ReplicationBucket};
pub use score::{EvictionStrategy, ValueWeights};
pub use stats::CacheStats;

use thiserror::Error;

/// Any error that may arise from cache admission.
///
/// Read-side integrity failures are deliberately not here: the cache
/// recovers from those locally (evict and report a miss).
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The block is larger than the entire cache; no eviction can help.
    #[error("block of {size} bytes exceeds total cache capacity {capacity}")]
    CapacityExceeded {
        /// Size of the rejected block.
        size: u64,
        /// Total configured capacity.
        capacity: u64,
    },

    /// The flex pool cannot hold the altruistic block even after evicting
    /// every other altruistic entry. Non-fatal: the caller simply does not
    /// cache.
    #[error("altruistic block of {size} bytes does not fit the {room} byte flex pool")]
    AltruisticSpaceExhausted {
        /// Size of the rejected block.
        size: u64,
        /// Current flex-pool ceiling.
        room: u64,
    },
}

/// A specialized [`Result`] for cache operations.
pub type Result<T> = std::result::Result<T, Error>;
