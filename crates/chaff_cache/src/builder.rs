// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! Cache construction.

use std::sync::Arc;
use std::time::Duration;

use tick::Clock;

use chaff_store::content_id;

use crate::cache::Verifier;
use crate::{BlockCache, EvictionStrategy};

/// Builder for [`BlockCache`].
///
/// Obtained from [`BlockCache::builder`], which takes the two parameters
/// without sensible defaults: the clock and the total capacity.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use chaff_cache::{BlockCache, EvictionStrategy};
/// use tick::Clock;
///
/// let cache = BlockCache::builder(Clock::new_frozen(), 20 * 1024 * 1024)
///     .min_personal(5 * 1024 * 1024)
///     .strategy(EvictionStrategy::Lru)
///     .eviction_cooldown(Duration::from_secs(60))
///     .build();
/// assert_eq!(cache.stats().total_capacity, 20 * 1024 * 1024);
/// ```
pub struct CacheBuilder {
    pub(crate) clock: Clock,
    pub(crate) total_capacity: u64,
    pub(crate) min_personal: u64,
    pub(crate) strategy: EvictionStrategy,
    pub(crate) cooldown_ms: u64,
    pub(crate) pre_evict_threshold: f64,
    pub(crate) gradual_eviction: bool,
    pub(crate) verifier: Option<Verifier>,
}

impl std::fmt::Debug for CacheBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheBuilder")
            .field("total_capacity", &self.total_capacity)
            .field("min_personal", &self.min_personal)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl CacheBuilder {
    pub(crate) fn new(clock: Clock, total_capacity: u64) -> Self {
        Self {
            clock,
            total_capacity,
            min_personal: 0,
            strategy: EvictionStrategy::default(),
            cooldown_ms: 5 * 60 * 1000,
            pre_evict_threshold: 0.85,
            gradual_eviction: true,
            verifier: Some(Arc::new(|bytes| content_id(bytes))),
        }
    }

    /// Capacity reserved for personal blocks, clamped to the total.
    #[must_use]
    pub fn min_personal(mut self, bytes: u64) -> Self {
        self.min_personal = bytes;
        self
    }

    /// Replaces the eviction strategy (default: value-based).
    #[must_use]
    pub fn strategy(mut self, strategy: EvictionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// How long a freshly stored block is spared from eviction (default:
    /// five minutes). The cooldown yields when nothing else can be evicted.
    #[must_use]
    pub fn eviction_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown_ms = cooldown.as_millis() as u64;
        self
    }

    /// Utilization fraction above which stores proactively shed altruistic
    /// blocks (default: 0.85). Set to 1.0 or above to disable.
    #[must_use]
    pub fn pre_evict_threshold(mut self, threshold: f64) -> Self {
        self.pre_evict_threshold = threshold.max(0.0);
        self
    }

    /// Whether eviction frees 1.25x the needed bytes to amortize churn
    /// (default: enabled).
    #[must_use]
    pub fn gradual_eviction(mut self, enabled: bool) -> Self {
        self.gradual_eviction = enabled;
        self
    }

    /// Replaces the read verifier (default: BLAKE3 [`content_id`]).
    ///
    /// Deployments whose blob store uses a different addressing scheme must
    /// install the matching verifier, or disable verification with
    /// [`without_verification`](Self::without_verification).
    #[must_use]
    pub fn verifier(mut self, verifier: Verifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Disables read verification. Reads become cheaper; a corrupted cache
    /// entry will then propagate instead of degrading into a miss.
    #[must_use]
    pub fn without_verification(mut self) -> Self {
        self.verifier = None;
        self
    }

    /// Builds the cache.
    #[must_use]
    pub fn build(self) -> BlockCache {
        BlockCache::from_builder(self)
    }
}
