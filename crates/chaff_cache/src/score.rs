// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! Eviction scoring strategies.
//!
//! Every strategy reduces a candidate to a scalar "evict-me" score; higher
//! means more evictable. Scores only ever compare candidates within one
//! eviction pass, so the absolute scale is irrelevant; what matters is the
//! ordering, and that ties break deterministically (by idle time, then cid)
//! for reproducible behavior under test.

use crate::entry::{HealthHint, ReplicationBucket};

/// The facts a scorer sees about one candidate.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate<'a> {
    pub(crate) age_secs: f64,
    pub(crate) idle_secs: f64,
    pub(crate) access_count: u64,
    pub(crate) health: Option<&'a HealthHint>,
    pub(crate) is_randomizer: bool,
}

/// Weights for [`EvictionStrategy::ValueBased`].
///
/// The eviction score is
/// `age·norm_age + freq·inv_freq + health·(1 − value) + randomizer·not_rand`,
/// where `value` is the weighted health value of the block:
/// `rep·rep_score + entropy·high_entropy + request·norm_rate +
/// missing·norm_missing`.
///
/// The normalizers are fixed: `norm_age(a) = a/(a+3600s)`,
/// `inv_freq = 1/(1+accesses)`, `norm_rate(r) = r/(r+16)`,
/// `norm_missing(m) = m/255`, and `rep_score` is 1.0/0.5/0.0 for
/// low/medium/high replication (rare blocks are worth keeping).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueWeights {
    /// Weight of normalized age in the eviction score.
    pub age: f64,
    /// Weight of inverse access frequency in the eviction score.
    pub freq: f64,
    /// Weight of `1 − value` in the eviction score.
    pub health: f64,
    /// Penalty for not being a randomizer (randomizers amortize across
    /// files, so they are kept preferentially).
    pub randomizer: f64,
    /// Weight of the replication bucket inside the health value.
    pub rep: f64,
    /// Weight of the high-entropy flag inside the health value.
    pub entropy: f64,
    /// Weight of the request rate inside the health value.
    pub request: f64,
    /// Weight of missing-region reports inside the health value.
    pub missing: f64,
}

impl Default for ValueWeights {
    fn default() -> Self {
        Self {
            age: 0.35,
            freq: 0.25,
            health: 0.3,
            randomizer: 0.1,
            rep: 0.4,
            entropy: 0.2,
            request: 0.25,
            missing: 0.15,
        }
    }
}

/// How the cache decides which block to evict next.
#[derive(Debug, Clone, Copy, PartialEq)]
#[non_exhaustive]
pub enum EvictionStrategy {
    /// Evict the longest-idle block.
    Lru,
    /// Evict the least-frequently-accessed block.
    Lfu,
    /// Evict the oldest block regardless of use.
    Age,
    /// Weighted blend of age, frequency, network health, and randomizer
    /// status. The default.
    ValueBased(ValueWeights),
    /// Picks among the fixed strategies based on recent hit rate. The rate
    /// is judged per window (64 evictions or 1024 reads, whichever closes
    /// first): below 0.5 the strategy rotates, at 0.8 it settles.
    Adaptive,
}

impl Default for EvictionStrategy {
    fn default() -> Self {
        Self::ValueBased(ValueWeights::default())
    }
}

/// Evictions that close an adaptive evaluation window.
pub(crate) const ADAPTIVE_EVICTION_WINDOW: u64 = 64;

/// Reads that close an adaptive evaluation window early, bounding how much
/// history a hit-rate verdict is computed over.
pub(crate) const ADAPTIVE_PROBE_WINDOW: u64 = 1024;

/// The fixed strategies [`EvictionStrategy::Adaptive`] cycles through while
/// the hit rate stays poor.
pub(crate) const ADAPTIVE_ROTATION: [EvictionStrategy; 3] = [
    EvictionStrategy::Lru,
    EvictionStrategy::Lfu,
    EvictionStrategy::ValueBased(ValueWeights {
        age: 0.35,
        freq: 0.25,
        health: 0.3,
        randomizer: 0.1,
        rep: 0.4,
        entropy: 0.2,
        request: 0.25,
        missing: 0.15,
    }),
];

/// Window hit rate below which the adaptive strategy always rotates.
pub(crate) const ADAPTIVE_ROTATE_BELOW: f64 = 0.5;

/// Window hit rate at which the adaptive strategy settles on its current
/// choice.
pub(crate) const ADAPTIVE_SETTLE_AT: f64 = 0.8;

pub(crate) fn score(strategy: &EvictionStrategy, candidate: &Candidate<'_>) -> f64 {
    match strategy {
        EvictionStrategy::Lru => candidate.idle_secs,
        EvictionStrategy::Lfu => inv_freq(candidate.access_count),
        EvictionStrategy::Age => candidate.age_secs,
        EvictionStrategy::ValueBased(w) => value_based(w, candidate),
        // The cache resolves Adaptive to a fixed strategy before scoring.
        EvictionStrategy::Adaptive => candidate.idle_secs,
    }
}

fn value_based(w: &ValueWeights, c: &Candidate<'_>) -> f64 {
    let norm_age = c.age_secs / (c.age_secs + 3600.0);
    let value = c.health.map_or(0.5, |h| health_value(w, h));
    let not_randomizer = if c.is_randomizer { 0.0 } else { 1.0 };

    w.age * norm_age
        + w.freq * inv_freq(c.access_count)
        + w.health * (1.0 - value)
        + w.randomizer * not_randomizer
}

fn health_value(w: &ValueWeights, h: &HealthHint) -> f64 {
    let rep = match h.replication {
        ReplicationBucket::Low => 1.0,
        ReplicationBucket::Medium => 0.5,
        ReplicationBucket::High => 0.0,
    };
    let entropy = if h.high_entropy { 1.0 } else { 0.0 };
    let rate = f64::from(h.request_rate);
    let request = rate / (rate + 16.0);
    let missing = f64::from(h.missing_regions) / 255.0;

    w.rep * rep + w.entropy * entropy + w.request * request + w.missing * missing
}

fn inv_freq(access_count: u64) -> f64 {
    1.0 / (1.0 + access_count as f64)
}
