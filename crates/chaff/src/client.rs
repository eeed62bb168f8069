// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! The client facade.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use tick::Clock;
use tokio::io::{AsyncRead, AsyncWrite};

use chaff_cache::{BlockCache, CacheStats};
use chaff_pool::{EntropyGate, RandomizerPool};
use chaff_store::{BlobStore, Cid};

use crate::metrics::Metrics;
use crate::{CancelToken, Config, Error, MetricsSnapshot, Result, download, upload};

/// Everything the pipelines share, behind one `Arc`.
pub(crate) struct Shared<S> {
    pub(crate) store: S,
    pub(crate) pool: RandomizerPool<S>,
    pub(crate) cache: BlockCache,
    pub(crate) metrics: Metrics,
    pub(crate) config: Config,
}

/// The chaff client: upload, download, and metrics over one blob store.
///
/// Construct once via [`Client::builder`] and share freely: the type is
/// cheaply clonable and all methods take `&self`. Tests instantiate their
/// own clients; there is deliberately no process-wide instance.
///
/// # Examples
///
/// See the [crate documentation](crate) for an end-to-end example.
#[derive(Clone)]
pub struct Client<S> {
    shared: Arc<Shared<S>>,
    clock: Clock,
}

impl<S> std::fmt::Debug for Client<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("pool_size", &self.shared.pool.len())
            .field("cache", &self.shared.cache.stats())
            .finish_non_exhaustive()
    }
}

impl<S> Client<S>
where
    S: BlobStore + Clone + Send + Sync + 'static,
{
    /// Creates a builder over the given blob store.
    #[must_use]
    pub fn builder(store: S) -> ClientBuilder<S> {
        ClientBuilder::new(store)
    }

    /// Uploads a byte stream and returns the descriptor cid, the file's
    /// public handle.
    ///
    /// Memory use stays near `upload_workers * BLOCK_SIZE` regardless of
    /// input size.
    ///
    /// # Errors
    ///
    /// Surfaces the first reader, pool, or store error observed; sibling
    /// workers are cancelled. Blob store deadlines are fatal here (there is
    /// no safe partial state to resume from). Blocks already stored by a
    /// failed upload remain in the store; they are indistinguishable from
    /// any other random block.
    pub async fn upload<R>(&self, reader: R, filename: &str) -> Result<Cid>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.upload_with_cancel(reader, filename, CancelToken::new())
            .await
    }

    /// [`upload`](Self::upload) with an external cancellation token.
    ///
    /// # Errors
    ///
    /// As for [`upload`](Self::upload), plus [`Error::Cancelled`].
    pub async fn upload_with_cancel<R>(
        &self,
        reader: R,
        filename: &str,
        cancel: CancelToken,
    ) -> Result<Cid>
    where
        R: AsyncRead + Unpin + Send,
    {
        upload::run_upload(Arc::clone(&self.shared), reader, filename, cancel).await
    }

    /// Downloads a whole file to `writer`, returning the bytes written.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::BlockUnavailable`] if any referenced block
    /// cannot be resolved (after the configured transient-failure retries),
    /// or with the first writer/store error observed.
    pub async fn download<W>(&self, descriptor_cid: &Cid, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.download_with_cancel(descriptor_cid, writer, CancelToken::new())
            .await
    }

    /// [`download`](Self::download) with an external cancellation token.
    ///
    /// # Errors
    ///
    /// As for [`download`](Self::download), plus [`Error::Cancelled`].
    pub async fn download_with_cancel<W>(
        &self,
        descriptor_cid: &Cid,
        writer: &mut W,
        cancel: CancelToken,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        download::run_download(Arc::clone(&self.shared), descriptor_cid, writer, None, cancel)
            .await
    }

    /// Downloads the byte range `[range.start, range.end)` of a file.
    ///
    /// Only blocks intersecting the range are fetched; the writer receives
    /// exactly the requested bytes, in order. Whole-file download is the
    /// same code path with the full range.
    ///
    /// # Errors
    ///
    /// As for [`download`](Self::download), plus [`Error::InvalidRange`] if
    /// the range does not lie within the file.
    pub async fn download_range<W>(
        &self,
        descriptor_cid: &Cid,
        writer: &mut W,
        range: Range<u64>,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.download_range_with_cancel(descriptor_cid, writer, range, CancelToken::new())
            .await
    }

    /// [`download_range`](Self::download_range) with an external
    /// cancellation token.
    ///
    /// # Errors
    ///
    /// As for [`download_range`](Self::download_range), plus
    /// [`Error::Cancelled`].
    pub async fn download_range_with_cancel<W>(
        &self,
        descriptor_cid: &Cid,
        writer: &mut W,
        range: Range<u64>,
        cancel: CancelToken,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        download::run_download(
            Arc::clone(&self.shared),
            descriptor_cid,
            writer,
            Some(range),
            cancel,
        )
        .await
    }

    /// A point-in-time view of the client's cumulative metrics.
    #[must_use]
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot(
            &self.shared.cache.stats(),
            self.shared.pool.len(),
            self.shared.pool.avg_reuse_count(),
        )
    }

    /// Cache statistics.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.shared.cache.stats()
    }

    /// The local block cache, e.g. for attaching health hints.
    #[must_use]
    pub fn cache(&self) -> &BlockCache {
        &self.shared.cache
    }

    /// The randomizer pool.
    #[must_use]
    pub fn pool(&self) -> &RandomizerPool<S> {
        &self.shared.pool
    }

    /// The underlying blob store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.shared.store
    }

    /// The clock driving cache and pool timestamps.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }
}

/// Builder for [`Client`].
///
/// The store is required up front and the [`Config`] before `build`; the
/// clock defaults to the Tokio-driven system clock.
pub struct ClientBuilder<S> {
    store: S,
    config: Option<Config>,
    clock: Option<Clock>,
    pool_rng_seed: Option<u64>,
}

impl<S> std::fmt::Debug for ClientBuilder<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S> ClientBuilder<S>
where
    S: BlobStore + Clone + Send + Sync + 'static,
{
    fn new(store: S) -> Self {
        Self {
            store,
            config: None,
            clock: None,
            pool_rng_seed: None,
        }
    }

    /// Supplies the configuration. Required.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Replaces the clock; tests inject a frozen one.
    #[must_use]
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Seeds the pool's selection RNG for reproducible randomizer choices.
    /// Intended for tests.
    #[must_use]
    pub fn pool_rng_seed(mut self, seed: u64) -> Self {
        self.pool_rng_seed = Some(seed);
        self
    }

    /// Validates the configuration, seeds the randomizer pool, and builds
    /// the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a missing or invalid configuration,
    /// and pool errors if seeding fails.
    pub async fn build(self) -> Result<Client<S>> {
        let config = self
            .config
            .ok_or_else(|| Error::Config("a configuration is required".into()))?;
        config.validate()?;

        let clock = self.clock.unwrap_or_else(Clock::new_tokio);

        let cache = BlockCache::builder(clock.clone(), config.cache.total_capacity)
            .min_personal(config.cache.min_personal_cache)
            .strategy(config.cache.eviction_strategy.into())
            .eviction_cooldown(Duration::from_secs(config.cache.eviction_cooldown_secs))
            .pre_evict_threshold(config.cache.pre_evict_threshold)
            .gradual_eviction(config.cache.enable_gradual_eviction)
            .build();

        let mut pool_builder = RandomizerPool::builder(self.store.clone(), clock.clone())
            .reuse_bias(config.pool.reuse_bias)
            .entropy_gate(EntropyGate::new(config.pool.entropy_floor_bits, 0.5));
        if let Some(seed) = self.pool_rng_seed {
            pool_builder = pool_builder.rng_seed(seed);
        }
        let pool = pool_builder.build();
        pool.seed(config.pool.seed_count).await?;

        Ok(Client {
            shared: Arc::new(Shared {
                store: self.store,
                pool,
                cache,
                metrics: Metrics::default(),
                config,
            }),
            clock,
        })
    }
}
