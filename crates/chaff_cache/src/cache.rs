// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! The cache proper: sharded storage, admission, eviction.
//!
//! # Locking model
//!
//! Storage is split into [`SHARD_COUNT`] buckets by cid hash, and the locks
//! mirror that split:
//!
//! - `shards[i]` guards bucket `i`'s entries. `get`/`has`/`stats` and the
//!   eviction scan take it shared; mutations take it exclusive.
//! - `admission[i]` serializes the *write path* of bucket `i`, so stores and
//!   removals of cids in different buckets proceed concurrently.
//! - `accounting` is the one cache-wide lock. Admission arithmetic (the
//!   personal floor, the flex-pool ceiling, `free_capacity`) and eviction
//!   both span every bucket, and per-bucket locks cannot keep those figures
//!   exact on their own; any step that changes occupancy pairs the byte
//!   accounting and the bucket mutation under this lock.
//!
//! Lock order is `admission[i]`, then `accounting`, then shard locks. No
//! path acquires `accounting` while holding a shard lock.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::UNIX_EPOCH;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tick::Clock;
use tracing::{debug, warn};

use chaff_store::Cid;

use crate::entry::StoredEntry;
use crate::score::{
    ADAPTIVE_EVICTION_WINDOW, ADAPTIVE_PROBE_WINDOW, ADAPTIVE_ROTATE_BELOW, ADAPTIVE_ROTATION,
    ADAPTIVE_SETTLE_AT, Candidate, score,
};
use crate::{CacheBuilder, CacheStats, Error, EvictionStrategy, HealthHint, Origin, Result};

/// Recomputes a content id from bytes, for read verification.
pub type Verifier = Arc<dyn Fn(&[u8]) -> Cid + Send + Sync>;

const SHARD_COUNT: usize = 16;

#[derive(Default)]
struct Accounting {
    personal_bytes: u64,
    altruistic_bytes: u64,
    personal_count: u64,
    altruistic_count: u64,
}

impl Accounting {
    fn used(&self) -> u64 {
        self.personal_bytes + self.altruistic_bytes
    }

    fn credit(&mut self, origin: Origin, size: u64) {
        match origin {
            Origin::Personal => {
                self.personal_bytes += size;
                self.personal_count += 1;
            }
            Origin::Altruistic => {
                self.altruistic_bytes += size;
                self.altruistic_count += 1;
            }
        }
    }

    fn debit(&mut self, origin: Origin, size: u64) {
        match origin {
            Origin::Personal => {
                self.personal_bytes -= size;
                self.personal_count -= 1;
            }
            Origin::Altruistic => {
                self.altruistic_bytes -= size;
                self.altruistic_count -= 1;
            }
        }
    }
}

/// State of the adaptive strategy search.
///
/// A window closes after [`ADAPTIVE_EVICTION_WINDOW`] evictions or
/// [`ADAPTIVE_PROBE_WINDOW`] reads, whichever comes first (checked at
/// eviction time, the only moment the scorer's choice matters). At close,
/// the window's hit rate decides:
///
/// - at or above [`ADAPTIVE_SETTLE_AT`]: the current strategy is a keeper;
///   settle on it.
/// - below [`ADAPTIVE_ROTATE_BELOW`]: rotate to the next strategy and
///   resume searching, settled or not.
/// - in between: a settled strategy stays; an unsettled search keeps
///   rotating, still looking for one that clears the settle bar.
///
/// Windows that close without any reads decide nothing.
struct AdaptiveState {
    rotation_index: usize,
    settled: bool,
    evictions_in_window: u64,
    hits_at_window_start: u64,
    misses_at_window_start: u64,
}

impl AdaptiveState {
    fn new() -> Self {
        Self {
            rotation_index: 0,
            settled: false,
            evictions_in_window: 0,
            hits_at_window_start: 0,
            misses_at_window_start: 0,
        }
    }
}

/// The partitioned local block cache.
///
/// See the crate documentation for the partition model. Constructed through
/// [`BlockCache::builder`]; safe to share across tasks behind an `Arc`.
///
/// # Examples
///
/// ```
/// use chaff_cache::{BlockCache, Origin};
/// use chaff_store::content_id;
/// use tick::Clock;
///
/// let cache = BlockCache::builder(Clock::new_frozen(), 1024 * 1024).build();
///
/// let bytes = bytes::Bytes::from_static(b"a block");
/// let cid = content_id(&bytes);
/// cache.store(&cid, bytes.clone(), Origin::Personal)?;
///
/// assert_eq!(cache.get(&cid), Some(bytes));
/// assert!(cache.has(&cid));
/// # Ok::<(), chaff_cache::Error>(())
/// ```
pub struct BlockCache {
    clock: Clock,
    total_capacity: u64,
    min_personal: u64,
    strategy: EvictionStrategy,
    cooldown_ms: u64,
    pre_evict_threshold: f64,
    gradual_eviction: bool,
    verifier: Option<Verifier>,

    shards: Vec<RwLock<HashMap<Cid, StoredEntry>>>,
    // One write-path lock per bucket; see the module docs for the full
    // locking model.
    admission: Vec<Mutex<()>>,
    // The cache-wide lock: occupancy arithmetic and eviction span every
    // bucket.
    accounting: Mutex<Accounting>,
    adaptive: Mutex<AdaptiveState>,

    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    integrity_failures: AtomicU64,
    altruistic_rejections: AtomicU64,
}

impl std::fmt::Debug for BlockCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockCache")
            .field("total_capacity", &self.total_capacity)
            .field("min_personal", &self.min_personal)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl BlockCache {
    /// Creates a builder over the given clock and total capacity in bytes.
    #[must_use]
    pub fn builder(clock: Clock, total_capacity: u64) -> CacheBuilder {
        CacheBuilder::new(clock, total_capacity)
    }

    pub(crate) fn from_builder(builder: CacheBuilder) -> Self {
        let min_personal = builder.min_personal.min(builder.total_capacity);
        Self {
            clock: builder.clock,
            total_capacity: builder.total_capacity,
            min_personal,
            strategy: builder.strategy,
            cooldown_ms: builder.cooldown_ms,
            pre_evict_threshold: builder.pre_evict_threshold,
            gradual_eviction: builder.gradual_eviction,
            verifier: builder.verifier,
            shards: (0..SHARD_COUNT)
                .map(|_| RwLock::new(HashMap::new()))
                .collect(),
            admission: (0..SHARD_COUNT).map(|_| Mutex::new(())).collect(),
            accounting: Mutex::new(Accounting::default()),
            adaptive: Mutex::new(AdaptiveState::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            integrity_failures: AtomicU64::new(0),
            altruistic_rejections: AtomicU64::new(0),
        }
    }

    /// Inserts or refreshes a block under the given origin.
    ///
    /// Storing an already-resident cid under the same origin refreshes its
    /// access metadata. Storing it under the *other* origin is the explicit
    /// re-store that moves it between partitions, subject to the target
    /// partition's admission rules.
    ///
    /// # Errors
    ///
    /// - [`Error::CapacityExceeded`] if the block is larger than the cache.
    /// - [`Error::AltruisticSpaceExhausted`] if an altruistic block cannot
    ///   fit the flex pool even after evicting all other altruistic blocks.
    ///   Personal stores never fail for space.
    pub fn store(&self, cid: &Cid, bytes: Bytes, origin: Origin) -> Result<()> {
        self.store_inner(cid, bytes, origin, false)
    }

    /// Inserts a randomizer block, marking it for the scorer's randomizer
    /// bonus. Same admission rules as [`store`](Self::store).
    ///
    /// # Errors
    ///
    /// As for [`store`](Self::store).
    pub fn store_randomizer(&self, cid: &Cid, bytes: Bytes, origin: Origin) -> Result<()> {
        self.store_inner(cid, bytes, origin, true)
    }

    fn store_inner(
        &self,
        cid: &Cid,
        bytes: Bytes,
        origin: Origin,
        is_randomizer: bool,
    ) -> Result<()> {
        let size = bytes.len() as u64;
        if size > self.total_capacity {
            return Err(Error::CapacityExceeded {
                size,
                capacity: self.total_capacity,
            });
        }

        let now = self.now_ms();
        let bucket = self.bucket_of(cid);
        let _admission = self.admission[bucket].lock();

        // Same-origin refresh changes no occupancy; the bucket locks alone
        // cover it.
        {
            let shard = self.shards[bucket].read();
            if let Some(existing) = shard.get(cid) {
                if existing.origin == origin && existing.is_randomizer == is_randomizer {
                    existing.touch(now);
                    return Ok(());
                }
            }
        }

        let mut acct = self.accounting.lock();

        // Explicit re-store: drop the old residency before re-admitting.
        if let Some(removed) = self.shards[bucket].write().remove(cid) {
            acct.debit(removed.origin, removed.size());
        }

        match origin {
            Origin::Personal => {
                let overflow = (acct.used() + size).saturating_sub(self.total_capacity);
                if overflow > 0 {
                    let freed =
                        self.evict(&mut acct, Origin::Altruistic, overflow, self.strategy, now);
                    if freed < overflow {
                        // Altruistic space alone was not enough; personal
                        // overflow falls back to LRU among personal.
                        self.evict(
                            &mut acct,
                            Origin::Personal,
                            overflow - freed,
                            EvictionStrategy::Lru,
                            now,
                        );
                    }
                }
            }
            Origin::Altruistic => {
                let room = self
                    .total_capacity
                    .saturating_sub(self.min_personal.max(acct.personal_bytes));
                if size > room {
                    self.altruistic_rejections.fetch_add(1, Ordering::Relaxed);
                    return Err(Error::AltruisticSpaceExhausted { size, room });
                }
                if acct.altruistic_bytes + size > room {
                    let need = acct.altruistic_bytes + size - room;
                    self.evict(&mut acct, Origin::Altruistic, need, self.strategy, now);
                }
            }
        }

        self.shards[bucket]
            .write()
            .insert(cid.clone(), StoredEntry::new(bytes, origin, is_randomizer, now));
        acct.credit(origin, size);

        // Predictive eviction: shed altruistic weight before the next store
        // has to wait for it.
        if self.pre_evict_threshold < 1.0 {
            let limit = (self.total_capacity as f64 * self.pre_evict_threshold) as u64;
            if acct.used() > limit {
                let need = acct.used() - limit;
                self.evict(&mut acct, Origin::Altruistic, need, self.strategy, now);
            }
        }

        Ok(())
    }

    /// Returns the block if present and intact, updating access metadata.
    ///
    /// Bytes failing content verification are evicted and reported as a
    /// miss; the caller never sees mismatched data.
    #[must_use]
    pub fn get(&self, cid: &Cid) -> Option<Bytes> {
        let shard = self.shards[self.bucket_of(cid)].read();
        let Some(entry) = shard.get(cid) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        if let Some(verifier) = &self.verifier {
            if verifier(&entry.bytes) != *cid {
                drop(shard);
                self.expel_corrupt(cid);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }

        entry.touch(self.now_ms());
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.bytes.clone())
    }

    /// Presence probe; does not update access metadata or verify contents.
    #[must_use]
    pub fn has(&self, cid: &Cid) -> bool {
        self.shards[self.bucket_of(cid)].read().contains_key(cid)
    }

    /// Removes a block explicitly. Returns `true` if it was resident.
    pub fn remove(&self, cid: &Cid) -> bool {
        let bucket = self.bucket_of(cid);
        let _admission = self.admission[bucket].lock();
        let mut acct = self.accounting.lock();
        match self.shards[bucket].write().remove(cid) {
            Some(entry) => {
                acct.debit(entry.origin, entry.size());
                true
            }
            None => false,
        }
    }

    /// Attaches a health hint to a resident block; no-op if absent.
    pub fn update_health(&self, cid: &Cid, hint: HealthHint) {
        if let Some(entry) = self.shards[self.bucket_of(cid)].write().get_mut(cid) {
            entry.health = Some(hint);
        }
    }

    /// A point-in-time statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let acct = self.accounting.lock();
        CacheStats {
            total_capacity: self.total_capacity,
            min_personal: self.min_personal,
            personal_bytes: acct.personal_bytes,
            altruistic_bytes: acct.altruistic_bytes,
            personal_count: acct.personal_count,
            altruistic_count: acct.altruistic_count,
            free_bytes: self.total_capacity - acct.used(),
            flex_room: self
                .total_capacity
                .saturating_sub(self.min_personal.max(acct.personal_bytes)),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            integrity_failures: self.integrity_failures.load(Ordering::Relaxed),
            altruistic_rejections: self.altruistic_rejections.load(Ordering::Relaxed),
        }
    }

    /// Drops every entry. Counters are preserved.
    pub fn clear(&self) {
        // Every bucket's write path is excluded before the wipe, in index
        // order to stay consistent with single-bucket acquirers.
        let _guards: Vec<_> = self.admission.iter().map(Mutex::lock).collect();
        let mut acct = self.accounting.lock();
        for shard in &self.shards {
            shard.write().clear();
        }
        *acct = Accounting::default();
    }

    fn bucket_of(&self, cid: &Cid) -> usize {
        let mut hasher = DefaultHasher::new();
        cid.hash(&mut hasher);
        (hasher.finish() as usize) % SHARD_COUNT
    }

    fn expel_corrupt(&self, cid: &Cid) {
        let bucket = self.bucket_of(cid);
        let _admission = self.admission[bucket].lock();
        let mut acct = self.accounting.lock();
        let removed = self.shards[bucket].write().remove(cid);
        if let Some(entry) = removed {
            acct.debit(entry.origin, entry.size());
            self.evictions.fetch_add(1, Ordering::Relaxed);
            self.integrity_failures.fetch_add(1, Ordering::Relaxed);
            warn!(%cid, "cached bytes failed verification, entry expelled");
        }
    }

    /// Frees at least `need` bytes from `region`, best effort. Returns the
    /// bytes actually freed.
    ///
    /// Cross-bucket by nature: the caller holds the accounting lock, which
    /// keeps the scan, the removals, and the byte accounting one atomic
    /// step against concurrent admissions.
    fn evict(
        &self,
        acct: &mut Accounting,
        region: Origin,
        need: u64,
        strategy: EvictionStrategy,
        now: u64,
    ) -> u64 {
        if need == 0 {
            return 0;
        }
        let target = if self.gradual_eviction {
            need + need / 4
        } else {
            need
        };
        let strategy = self.resolve(strategy);

        struct Row {
            cid: Cid,
            bucket: usize,
            size: u64,
            score: f64,
            last_ms: u64,
            cooled: bool,
        }

        let mut rows: Vec<Row> = Vec::new();
        for (bucket, shard) in self.shards.iter().enumerate() {
            let shard = shard.read();
            for (cid, entry) in shard.iter().filter(|(_, e)| e.origin == region) {
                let candidate = Candidate {
                    age_secs: ms_to_secs(now.saturating_sub(entry.cached_at_ms)),
                    idle_secs: ms_to_secs(now.saturating_sub(entry.last_accessed_ms())),
                    access_count: entry.access_count(),
                    health: entry.health.as_ref(),
                    is_randomizer: entry.is_randomizer,
                };
                rows.push(Row {
                    cid: cid.clone(),
                    bucket,
                    size: entry.size(),
                    score: score(&strategy, &candidate),
                    last_ms: entry.last_accessed_ms(),
                    cooled: now.saturating_sub(entry.cached_at_ms) < self.cooldown_ms,
                });
            }
        }

        // Highest score first; ties break by idle time then cid so eviction
        // order is reproducible.
        rows.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.last_ms.cmp(&b.last_ms))
                .then_with(|| a.cid.cmp(&b.cid))
        });

        let mut freed = 0u64;
        let mut victims = 0u64;
        // Recently stored blocks are under cooldown and spared, unless the
        // eligible candidates cannot cover the need.
        for pass_cooled in [false, true] {
            for row in rows.iter().filter(|r| r.cooled == pass_cooled) {
                if freed >= target || (pass_cooled && freed >= need) {
                    break;
                }
                let removed = self.shards[row.bucket].write().remove(&row.cid);
                if let Some(entry) = removed {
                    acct.debit(entry.origin, entry.size());
                    freed += entry.size();
                    victims += 1;
                    debug!(cid = %row.cid, size = row.size, score = row.score, "evicted block");
                }
            }
            if freed >= need {
                break;
            }
        }

        if victims > 0 {
            self.evictions.fetch_add(victims, Ordering::Relaxed);
            self.note_evictions(victims);
        }
        freed
    }

    fn resolve(&self, strategy: EvictionStrategy) -> EvictionStrategy {
        match strategy {
            EvictionStrategy::Adaptive => {
                let state = self.adaptive.lock();
                ADAPTIVE_ROTATION[state.rotation_index % ADAPTIVE_ROTATION.len()]
            }
            fixed => fixed,
        }
    }

    /// Advances the adaptive window; see [`AdaptiveState`] for the rule.
    fn note_evictions(&self, count: u64) {
        if self.strategy != EvictionStrategy::Adaptive {
            return;
        }
        let mut state = self.adaptive.lock();
        state.evictions_in_window += count;

        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let window_hits = hits - state.hits_at_window_start;
        let window_misses = misses - state.misses_at_window_start;
        let window_reads = window_hits + window_misses;

        if state.evictions_in_window < ADAPTIVE_EVICTION_WINDOW
            && window_reads < ADAPTIVE_PROBE_WINDOW
        {
            return;
        }

        if window_reads > 0 {
            let rate = window_hits as f64 / window_reads as f64;
            if rate >= ADAPTIVE_SETTLE_AT {
                state.settled = true;
            } else if rate < ADAPTIVE_ROTATE_BELOW || !state.settled {
                state.settled = false;
                state.rotation_index = (state.rotation_index + 1) % ADAPTIVE_ROTATION.len();
                debug!(
                    rotation_index = state.rotation_index,
                    hit_rate = rate,
                    "adaptive eviction rotated strategy"
                );
            }
        }

        state.evictions_in_window = 0;
        state.hits_at_window_start = hits;
        state.misses_at_window_start = misses;
    }

    fn now_ms(&self) -> u64 {
        self.clock
            .system_time()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64)
    }
}

fn ms_to_secs(ms: u64) -> f64 {
    ms as f64 / 1000.0
}
