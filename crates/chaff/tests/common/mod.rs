// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! Shared scaffolding for the integration suites.

#![allow(dead_code, reason = "each suite uses a subset of the scaffolding")]

use chaff::{Client, Config};
use chaff_store::MemoryBlobStore;

/// A configuration sized for tests: plenty of cache, a small seeded pool,
/// and fast retries.
pub fn test_config() -> Config {
    let mut config = Config::new(64 * 1024 * 1024, 16 * 1024 * 1024);
    config.pool.seed_count = 4;
    config.download.retry_backoff_base_ms = 1;
    config
}

/// A client over a fresh in-memory store.
pub async fn memory_client() -> Client<MemoryBlobStore> {
    client_over(MemoryBlobStore::new()).await
}

/// A client over an existing store, e.g. to model a second peer.
pub async fn client_over(store: MemoryBlobStore) -> Client<MemoryBlobStore> {
    init_tracing();
    Client::builder(store)
        .config(test_config())
        .pool_rng_seed(42)
        .build()
        .await
        .expect("test client builds")
}

/// Routes pipeline tracing into the test harness's captured output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// A client over a fresh store with an explicit pool seed count.
pub async fn client_with_pool(seed_count: usize) -> Client<MemoryBlobStore> {
    init_tracing();
    let mut config = test_config();
    config.pool.seed_count = seed_count;
    Client::builder(MemoryBlobStore::new())
        .config(config)
        .pool_rng_seed(42)
        .build()
        .await
        .expect("test client builds")
}

/// Deterministic pseudo-random content of the given length.
pub fn content(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = fastrand::Rng::with_seed(seed);
    (0..len).map(|_| rng.u8(..)).collect()
}
