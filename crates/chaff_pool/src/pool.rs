// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! Pool storage and the selection policy.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::UNIX_EPOCH;

use parking_lot::{Mutex, RwLock};
use tick::Clock;
use tracing::debug;

use chaff_block::{BLOCK_SIZE, Block};
use chaff_store::{BlobStore, Cid};

use crate::{EntropyGate, Error, Result};

/// A randomizer handed out by [`RandomizerPool::select_two`].
#[derive(Debug, Clone)]
pub struct Selected {
    /// The randomizer's content identifier.
    pub cid: Cid,
    /// The randomizer block itself.
    pub block: Block,
    /// `true` if this randomizer was generated and promoted by the selection
    /// that returned it, rather than reused from the pool.
    pub freshly_promoted: bool,
    /// The randomizer's reuse count including the selection that returned
    /// it.
    pub reuse_count: u64,
}

/// A point-in-time view of one pool entry, for metrics.
#[derive(Debug, Clone)]
pub struct PoolEntrySnapshot {
    /// The entry's content identifier.
    pub cid: Cid,
    /// Anonymizations this randomizer has participated in.
    pub reuse_count: u64,
    /// Milliseconds since the Unix epoch of the last participation.
    pub last_used_millis: u64,
}

struct PoolEntry {
    cid: Cid,
    block: Block,
    reuse_count: AtomicU64,
    last_used_millis: AtomicU64,
}

#[derive(Default)]
struct PoolInner {
    entries: HashMap<Cid, Arc<PoolEntry>>,
    // Insertion order, for sampling without re-collecting the map.
    order: Vec<Arc<PoolEntry>>,
}

/// The long-lived set of universal randomizer blocks.
///
/// See the crate documentation for the policy; the type is safe to share
/// across tasks (`select_two` snapshots under a read lock, promotion takes
/// the write lock only to insert, reuse accounting is atomic).
///
/// Two concurrent selections may pick the same entry; that is acceptable
/// and merely accelerates its popularity.
pub struct RandomizerPool<S> {
    store: S,
    clock: Clock,
    gate: EntropyGate,
    reuse_bias: f64,
    max_generate_attempts: u32,
    rng: Mutex<fastrand::Rng>,
    inner: RwLock<PoolInner>,
}

impl<S> std::fmt::Debug for RandomizerPool<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomizerPool")
            .field("len", &self.len())
            .field("reuse_bias", &self.reuse_bias)
            .finish_non_exhaustive()
    }
}

impl<S: BlobStore> RandomizerPool<S> {
    /// Creates a builder over the given blob store and clock.
    #[must_use]
    pub fn builder(store: S, clock: Clock) -> PoolBuilder<S> {
        PoolBuilder::new(store, clock)
    }

    /// Generates and promotes `count` fresh high-entropy randomizers.
    ///
    /// Called once at startup so that early uploads already draw from a
    /// populated pool.
    ///
    /// # Errors
    ///
    /// Fails if the RNG is unavailable, generation keeps failing the
    /// entropy gate, or the store rejects a block.
    pub async fn seed(&self, count: usize) -> Result<()> {
        for _ in 0..count {
            let block = self.generate_block()?;
            self.promote(block).await?;
        }
        debug!(pool_size = self.len(), "seeded randomizer pool");
        Ok(())
    }

    /// Selects two distinct randomizers for anonymizing one block.
    ///
    /// With fewer than two entries in the pool the missing randomizers are
    /// generated, promoted, and returned as part of the pair, so the call
    /// always succeeds on a healthy system and the pool only ever grows.
    ///
    /// # Errors
    ///
    /// Fails only when generation is required and the RNG or the entropy
    /// gate defeats it, or the store rejects a promotion.
    pub async fn select_two(&self) -> Result<[Selected; 2]> {
        let snapshot: Vec<Arc<PoolEntry>> = self.inner.read().order.clone();

        match snapshot.len() {
            0 => {
                let first = self.promote_fresh().await?;
                // A BLOCK_SIZE collision from the OS RNG is not a real
                // possibility, but the distinctness invariant is cheap to
                // enforce unconditionally.
                let mut second = self.promote_fresh().await?;
                let mut attempts = 0;
                while second.cid == first.cid {
                    attempts += 1;
                    if attempts >= self.max_generate_attempts {
                        return Err(Error::GenerationFailed { attempts });
                    }
                    second = self.promote_fresh().await?;
                }
                Ok([first, second])
            }
            1 => {
                let only = &snapshot[0];
                let first = self.mark_used(only);
                let mut second = self.promote_fresh().await?;
                let mut attempts = 0;
                while second.cid == first.cid {
                    attempts += 1;
                    if attempts >= self.max_generate_attempts {
                        return Err(Error::GenerationFailed { attempts });
                    }
                    second = self.promote_fresh().await?;
                }
                Ok([first, second])
            }
            len => {
                let (i, j) = {
                    let mut rng = self.rng.lock();
                    if rng.f64() < self.reuse_bias {
                        pick_two_by_popularity(&mut rng, &snapshot)
                    } else {
                        pick_two_uniform(&mut rng, len)
                    }
                };
                Ok([self.mark_used(&snapshot[i]), self.mark_used(&snapshot[j])])
            }
        }
    }

    /// Registers a block as a new pool randomizer.
    ///
    /// The block is checked against the entropy gate, stored through the
    /// blob store to obtain its cid, and inserted with a reuse count of
    /// zero. Promoting bytes that are already pooled is a no-op returning
    /// the existing cid.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GenerationFailed`] if the block fails the entropy
    /// gate, or a store error if registration fails.
    pub async fn promote(&self, block: Block) -> Result<Cid> {
        if !self.gate.accepts(block.as_slice()) {
            return Err(Error::GenerationFailed { attempts: 1 });
        }

        let cid = self.store.put(block.as_bytes().clone()).await?;

        let mut inner = self.inner.write();
        if !inner.entries.contains_key(&cid) {
            let entry = Arc::new(PoolEntry {
                cid: cid.clone(),
                block,
                reuse_count: AtomicU64::new(0),
                last_used_millis: AtomicU64::new(self.now_millis()),
            });
            inner.entries.insert(cid.clone(), Arc::clone(&entry));
            inner.order.push(entry);
            debug!(%cid, pool_size = inner.order.len(), "promoted randomizer");
        }
        Ok(cid)
    }

    async fn promote_fresh(&self) -> Result<Selected> {
        let block = self.generate_block()?;
        let cid = self.promote(block.clone()).await?;
        let selected = {
            let inner = self.inner.read();
            let entry = inner
                .entries
                .get(&cid)
                .expect("just promoted entry is present");
            self.mark_used(entry)
        };
        Ok(Selected {
            freshly_promoted: true,
            ..selected
        })
    }
}

impl<S> RandomizerPool<S> {
    /// The reuse count of a pooled randomizer, or `None` if unknown.
    #[must_use]
    pub fn reuse_count(&self, cid: &Cid) -> Option<u64> {
        self.inner
            .read()
            .entries
            .get(cid)
            .map(|e| e.reuse_count.load(Ordering::Relaxed))
    }

    /// Number of randomizers in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    /// Returns `true` if the pool holds no randomizers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mean reuse count across the pool, `0.0` when empty.
    #[must_use]
    pub fn avg_reuse_count(&self) -> f64 {
        let inner = self.inner.read();
        if inner.order.is_empty() {
            return 0.0;
        }
        let total: u64 = inner
            .order
            .iter()
            .map(|e| e.reuse_count.load(Ordering::Relaxed))
            .sum();
        total as f64 / inner.order.len() as f64
    }

    /// A point-in-time snapshot of every entry, for metrics only.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PoolEntrySnapshot> {
        self.inner
            .read()
            .order
            .iter()
            .map(|e| PoolEntrySnapshot {
                cid: e.cid.clone(),
                reuse_count: e.reuse_count.load(Ordering::Relaxed),
                last_used_millis: e.last_used_millis.load(Ordering::Relaxed),
            })
            .collect()
    }

    fn generate_block(&self) -> Result<Block> {
        for attempt in 1..=self.max_generate_attempts {
            let mut buf = vec![0u8; BLOCK_SIZE];
            getrandom::getrandom(&mut buf).map_err(Error::Rng)?;
            if self.gate.accepts(&buf) {
                return Block::from_partial(&buf).map_err(|_oversize| Error::GenerationFailed {
                    attempts: attempt,
                });
            }
        }
        Err(Error::GenerationFailed {
            attempts: self.max_generate_attempts,
        })
    }

    fn mark_used(&self, entry: &Arc<PoolEntry>) -> Selected {
        let count = entry.reuse_count.fetch_add(1, Ordering::Relaxed) + 1;
        entry
            .last_used_millis
            .store(self.now_millis(), Ordering::Relaxed);
        Selected {
            cid: entry.cid.clone(),
            block: entry.block.clone(),
            freshly_promoted: false,
            reuse_count: count,
        }
    }

    fn now_millis(&self) -> u64 {
        self.clock
            .system_time()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64)
    }
}

fn pick_two_uniform(rng: &mut fastrand::Rng, len: usize) -> (usize, usize) {
    let i = rng.usize(..len);
    let mut j = rng.usize(..len - 1);
    if j >= i {
        j += 1;
    }
    (i, j)
}

fn pick_two_by_popularity(rng: &mut fastrand::Rng, entries: &[Arc<PoolEntry>]) -> (usize, usize) {
    // Weight each entry by reuse_count + 1 so unused entries stay reachable.
    let weights: Vec<u64> = entries
        .iter()
        .map(|e| e.reuse_count.load(Ordering::Relaxed) + 1)
        .collect();

    let first = weighted_index(rng, &weights, None);
    let second = weighted_index(rng, &weights, Some(first));
    (first, second)
}

fn weighted_index(rng: &mut fastrand::Rng, weights: &[u64], skip: Option<usize>) -> usize {
    let total: u64 = weights
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != skip)
        .map(|(_, w)| *w)
        .sum();
    let mut draw = rng.u64(..total);
    for (i, &w) in weights.iter().enumerate() {
        if Some(i) == skip {
            continue;
        }
        if draw < w {
            return i;
        }
        draw -= w;
    }
    // Unreachable with a positive total; fall back to the last eligible
    // index to keep the function total.
    weights.len() - 1 - usize::from(skip == Some(weights.len() - 1))
}

/// Builder for [`RandomizerPool`].
///
/// # Examples
///
/// ```
/// use chaff_pool::{EntropyGate, RandomizerPool};
/// use chaff_store::MemoryBlobStore;
/// use tick::Clock;
///
/// let pool = RandomizerPool::builder(MemoryBlobStore::new(), Clock::new_frozen())
///     .reuse_bias(0.9)
///     .entropy_gate(EntropyGate::new(4.0, 0.6))
///     .build();
/// assert!(pool.is_empty());
/// ```
#[derive(Debug)]
pub struct PoolBuilder<S> {
    store: S,
    clock: Clock,
    gate: EntropyGate,
    reuse_bias: f64,
    max_generate_attempts: u32,
    rng_seed: Option<u64>,
}

impl<S: BlobStore> PoolBuilder<S> {
    fn new(store: S, clock: Clock) -> Self {
        Self {
            store,
            clock,
            gate: EntropyGate::default(),
            reuse_bias: 0.8,
            max_generate_attempts: 4,
            rng_seed: None,
        }
    }

    /// Probability of selecting by popularity rather than uniformly.
    #[must_use]
    pub fn reuse_bias(mut self, bias: f64) -> Self {
        self.reuse_bias = bias.clamp(0.0, 1.0);
        self
    }

    /// Replaces the entropy gate.
    #[must_use]
    pub fn entropy_gate(mut self, gate: EntropyGate) -> Self {
        self.gate = gate;
        self
    }

    /// Bounds consecutive generation attempts before giving up.
    #[must_use]
    pub fn max_generate_attempts(mut self, attempts: u32) -> Self {
        self.max_generate_attempts = attempts.max(1);
        self
    }

    /// Seeds the selection RNG, making the policy's draws reproducible.
    ///
    /// Randomizer *contents* still come from the OS RNG; only the choice
    /// among pooled entries is affected. Intended for tests.
    #[must_use]
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Builds the pool.
    #[must_use]
    pub fn build(self) -> RandomizerPool<S> {
        RandomizerPool {
            store: self.store,
            clock: self.clock,
            gate: self.gate,
            reuse_bias: self.reuse_bias,
            max_generate_attempts: self.max_generate_attempts,
            rng: Mutex::new(
                self.rng_seed
                    .map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed),
            ),
            inner: RwLock::new(PoolInner::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use chaff_store::MemoryBlobStore;

    use super::*;

    fn pool(store: MemoryBlobStore) -> RandomizerPool<MemoryBlobStore> {
        RandomizerPool::builder(store, Clock::new_frozen())
            .rng_seed(7)
            .build()
    }

    #[tokio::test]
    async fn empty_pool_promotes_two_fresh_randomizers() {
        let p = pool(MemoryBlobStore::new());
        let [r1, r2] = p.select_two().await.expect("select");

        assert_ne!(r1.cid, r2.cid);
        assert!(r1.freshly_promoted && r2.freshly_promoted);
        assert_eq!(p.len(), 2);
    }

    #[tokio::test]
    async fn single_entry_pool_reuses_it() {
        let p = pool(MemoryBlobStore::new());
        p.seed(1).await.expect("seed");
        let seeded = p.snapshot()[0].cid.clone();

        let [r1, r2] = p.select_two().await.expect("select");
        assert_eq!(r1.cid, seeded);
        assert!(!r1.freshly_promoted);
        assert!(r2.freshly_promoted);
        assert_eq!(p.len(), 2);
    }

    #[tokio::test]
    async fn seeded_pool_always_returns_distinct_pairs() {
        let p = pool(MemoryBlobStore::new());
        p.seed(4).await.expect("seed");

        for _ in 0..64 {
            let [r1, r2] = p.select_two().await.expect("select");
            assert_ne!(r1.cid, r2.cid);
            assert!(!r1.freshly_promoted);
            assert!(!r2.freshly_promoted);
        }
        assert_eq!(p.len(), 4, "selection must not grow a populated pool");
    }

    #[tokio::test]
    async fn reuse_counts_grow_monotonically() {
        let p = pool(MemoryBlobStore::new());
        p.seed(2).await.expect("seed");

        let mut floor: u64 = 0;
        for _ in 0..10 {
            let selections = p.select_two().await.expect("select");
            let max = selections.iter().map(|s| s.reuse_count).max().expect("two");
            assert!(max >= floor);
            floor = max;
        }

        let total: u64 = p.snapshot().iter().map(|s| s.reuse_count).sum();
        assert_eq!(total, 20, "each selection accounts exactly two uses");
        assert!((p.avg_reuse_count() - 10.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn promotion_registers_block_with_store() {
        let store = MemoryBlobStore::new();
        let p = pool(store.clone());
        p.seed(1).await.expect("seed");

        let cid = p.snapshot()[0].cid.clone();
        assert!(store.has(&cid).await.expect("has"));
        assert_eq!(p.reuse_count(&cid), Some(0));
    }

    #[tokio::test]
    async fn promote_is_idempotent_per_content() {
        let p = pool(MemoryBlobStore::new());
        let block = p.generate_block().expect("generate");

        let a = p.promote(block.clone()).await.expect("promote");
        let b = p.promote(block).await.expect("re-promote");
        assert_eq!(a, b);
        assert_eq!(p.len(), 1);
    }

    #[tokio::test]
    async fn impossible_gate_surfaces_generation_failure() {
        let p = RandomizerPool::builder(MemoryBlobStore::new(), Clock::new_frozen())
            .entropy_gate(EntropyGate::new(8.1, 0.5))
            .max_generate_attempts(3)
            .build();

        let err = p.select_two().await.expect_err("gate admits nothing");
        assert!(matches!(err, Error::GenerationFailed { attempts: 3 }));
    }

    #[tokio::test]
    async fn low_entropy_promotion_is_rejected() {
        let p = pool(MemoryBlobStore::new());
        let err = p
            .promote(Block::zeroed())
            .await
            .expect_err("zeros must not pool");
        assert!(matches!(err, Error::GenerationFailed { .. }));
        assert!(p.is_empty());
    }

    #[test]
    fn thread_safe_type() {
        static_assertions::assert_impl_all!(RandomizerPool<MemoryBlobStore>: Send, Sync);
    }
}
