// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! Typed configuration.
//!
//! The structs deserialize from whatever configuration source the
//! surrounding application uses; only the two cache capacities have no
//! default and must always be supplied.

use std::time::Duration;

use serde::Deserialize;

use chaff_cache::{EvictionStrategy, ValueWeights};

use crate::{Error, Result};

/// Complete configuration for a [`Client`][crate::Client].
///
/// # Examples
///
/// ```
/// use chaff::Config;
///
/// let config = Config::new(64 * 1024 * 1024, 16 * 1024 * 1024);
/// assert_eq!(config.upload_workers, 8);
/// config.validate().expect("defaults are valid");
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Parallel workers in the upload pipeline.
    #[serde(default = "default_workers")]
    pub upload_workers: usize,
    /// Parallel workers in the download pipeline.
    #[serde(default = "default_workers")]
    pub download_workers: usize,
    /// Per-call deadline for blob store operations, in milliseconds.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    /// Cache sizing and eviction.
    pub cache: CacheConfig,
    /// Randomizer pool behavior.
    #[serde(default)]
    pub pool: PoolConfig,
    /// Download retry behavior.
    #[serde(default)]
    pub download: DownloadConfig,
}

/// Cache sizing and eviction configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Total cache capacity in bytes. Required.
    pub total_capacity: u64,
    /// Capacity reserved for personal blocks, in bytes. Required.
    pub min_personal_cache: u64,
    /// Eviction strategy.
    #[serde(default)]
    pub eviction_strategy: EvictionStrategyKind,
    /// Seconds a freshly stored block is spared from eviction.
    #[serde(default = "default_cooldown_secs")]
    pub eviction_cooldown_secs: u64,
    /// Utilization fraction that triggers predictive eviction.
    #[serde(default = "default_pre_evict_threshold")]
    pub pre_evict_threshold: f64,
    /// Whether eviction overshoots by 25% to amortize churn.
    #[serde(default = "default_true")]
    pub enable_gradual_eviction: bool,
}

/// Randomizer pool configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PoolConfig {
    /// Randomizers generated at startup.
    pub seed_count: usize,
    /// Probability of popularity-weighted (vs uniform) selection.
    pub reuse_bias: f64,
    /// First-order entropy floor for pool admission, in bits per byte.
    pub entropy_floor_bits: f64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            seed_count: 32,
            reuse_bias: 0.8,
            entropy_floor_bits: 5.0,
        }
    }
}

/// Download retry configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DownloadConfig {
    /// Retries after the first failed attempt of a transient fetch.
    pub retry_attempts: u32,
    /// Base of the exponential retry backoff, in milliseconds.
    pub retry_backoff_base_ms: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_backoff_base_ms: 100,
        }
    }
}

/// The eviction strategies nameable in configuration.
///
/// [`ValueBased`](Self::ValueBased) maps to the default scoring weights;
/// custom weights are code-level configuration via
/// [`chaff_cache::CacheBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionStrategyKind {
    /// Least recently used.
    Lru,
    /// Least frequently used.
    Lfu,
    /// Oldest first.
    Age,
    /// Health-aware weighted scoring. The default.
    #[default]
    ValueBased,
    /// Hit-rate-driven choice among the above.
    Adaptive,
}

impl From<EvictionStrategyKind> for EvictionStrategy {
    fn from(kind: EvictionStrategyKind) -> Self {
        match kind {
            EvictionStrategyKind::Lru => Self::Lru,
            EvictionStrategyKind::Lfu => Self::Lfu,
            EvictionStrategyKind::Age => Self::Age,
            EvictionStrategyKind::ValueBased => Self::ValueBased(ValueWeights::default()),
            EvictionStrategyKind::Adaptive => Self::Adaptive,
        }
    }
}

impl Config {
    /// A configuration with the given cache capacities and every other
    /// option at its default.
    #[must_use]
    pub fn new(total_capacity: u64, min_personal_cache: u64) -> Self {
        Self {
            upload_workers: default_workers(),
            download_workers: default_workers(),
            store_timeout_ms: default_store_timeout_ms(),
            cache: CacheConfig {
                total_capacity,
                min_personal_cache,
                eviction_strategy: EvictionStrategyKind::default(),
                eviction_cooldown_secs: default_cooldown_secs(),
                pre_evict_threshold: default_pre_evict_threshold(),
                enable_gradual_eviction: true,
            },
            pool: PoolConfig::default(),
            download: DownloadConfig::default(),
        }
    }

    /// Checks cross-field consistency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending option.
    pub fn validate(&self) -> Result<()> {
        if self.upload_workers == 0 || self.download_workers == 0 {
            return Err(Error::Config("worker counts must be nonzero".into()));
        }
        if self.store_timeout_ms == 0 {
            return Err(Error::Config("store_timeout_ms must be nonzero".into()));
        }
        if self.cache.total_capacity == 0 {
            return Err(Error::Config("cache.total_capacity must be nonzero".into()));
        }
        if self.cache.min_personal_cache > self.cache.total_capacity {
            return Err(Error::Config(
                "cache.min_personal_cache cannot exceed cache.total_capacity".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.pool.reuse_bias) {
            return Err(Error::Config("pool.reuse_bias must lie in [0, 1]".into()));
        }
        if !(0.0..=8.0).contains(&self.pool.entropy_floor_bits) {
            return Err(Error::Config(
                "pool.entropy_floor_bits must lie in [0, 8]".into(),
            ));
        }
        Ok(())
    }

    /// The per-call blob store deadline as a [`Duration`].
    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// The retry backoff base as a [`Duration`].
    #[must_use]
    pub fn retry_backoff_base(&self) -> Duration {
        Duration::from_millis(self.download.retry_backoff_base_ms)
    }
}

fn default_workers() -> usize {
    8
}

fn default_store_timeout_ms() -> u64 {
    30_000
}

fn default_cooldown_secs() -> u64 {
    300
}

fn default_pre_evict_threshold() -> f64 {
    0.85
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_surface() {
        let config = Config::new(1024, 512);
        assert_eq!(config.upload_workers, 8);
        assert_eq!(config.download_workers, 8);
        assert_eq!(config.cache.eviction_strategy, EvictionStrategyKind::ValueBased);
        assert_eq!(config.cache.eviction_cooldown_secs, 300);
        assert!((config.cache.pre_evict_threshold - 0.85).abs() < f64::EPSILON);
        assert!(config.cache.enable_gradual_eviction);
        assert_eq!(config.pool.seed_count, 32);
        assert!((config.pool.reuse_bias - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.download.retry_attempts, 3);
        assert_eq!(config.download.retry_backoff_base_ms, 100);
        config.validate().expect("defaults validate");
    }

    #[test]
    fn floor_above_capacity_is_rejected() {
        let config = Config::new(1024, 2048);
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn zero_workers_are_rejected() {
        let mut config = Config::new(1024, 0);
        config.upload_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn deserializes_with_only_required_fields() {
        let parsed: Config = serde_json::from_str(
            r#"{ "cache": { "total_capacity": 1048576, "min_personal_cache": 262144 } }"#,
        )
        .expect("minimal config parses");
        assert_eq!(parsed.cache.total_capacity, 1_048_576);
        assert_eq!(parsed.upload_workers, 8);
        assert_eq!(
            parsed.cache.eviction_strategy,
            EvictionStrategyKind::ValueBased
        );
    }

    #[test]
    fn strategy_names_are_kebab_case() {
        let parsed: Config = serde_json::from_str(
            r#"{ "cache": {
                "total_capacity": 1,
                "min_personal_cache": 0,
                "eviction_strategy": "value-based"
            } }"#,
        )
        .expect("parses");
        assert_eq!(
            parsed.cache.eviction_strategy,
            EvictionStrategyKind::ValueBased
        );
    }
}
