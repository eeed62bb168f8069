// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! Fault-injection wrappers for exercising failure paths in tests.
//!
//! These types are available with the `test-util` feature and are not part
//! of the production surface.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::{BlobStore, Cid, Error, Result};

/// Wraps a store so that the first N `get` calls per cid fail transiently.
///
/// Useful for asserting that retry logic survives exactly the advertised
/// number of transient failures.
///
/// # Examples
///
/// ```
/// use chaff_store::testing::FlakyStore;
/// use chaff_store::{BlobStore, MemoryBlobStore};
/// # futures::executor::block_on(async {
///
/// let inner = MemoryBlobStore::new();
/// let cid = inner.put(bytes::Bytes::from_static(b"x")).await?;
///
/// let flaky = FlakyStore::new(inner, 2);
/// assert!(flaky.get(&cid).await.is_err());
/// assert!(flaky.get(&cid).await.is_err());
/// assert!(flaky.get(&cid).await.is_ok());
/// # Ok::<(), chaff_store::Error>(())
/// # });
/// ```
#[derive(Debug)]
pub struct FlakyStore<S> {
    inner: S,
    failures_per_cid: u32,
    observed: Arc<Mutex<HashMap<Cid, u32>>>,
}

impl<S> FlakyStore<S> {
    /// Wraps `inner`, failing the first `failures_per_cid` gets of each cid.
    pub fn new(inner: S, failures_per_cid: u32) -> Self {
        Self {
            inner,
            failures_per_cid,
            observed: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Total number of injected failures so far.
    pub fn injected_failures(&self) -> u32 {
        self.observed.lock().values().sum()
    }
}

impl<S: BlobStore> BlobStore for FlakyStore<S> {
    async fn put(&self, bytes: Bytes) -> Result<Cid> {
        self.inner.put(bytes).await
    }

    async fn get(&self, cid: &Cid) -> Result<Bytes> {
        {
            let mut observed = self.observed.lock();
            let seen = observed.entry(cid.clone()).or_insert(0);
            if *seen < self.failures_per_cid {
                *seen += 1;
                return Err(Error::transient("injected failure"));
            }
        }
        self.inner.get(cid).await
    }

    async fn has(&self, cid: &Cid) -> Result<bool> {
        self.inner.has(cid).await
    }
}

/// Wraps a store, delaying every call by a fixed duration.
///
/// Pair with a small per-call timeout to exercise deadline handling without
/// a real slow backend.
#[derive(Debug)]
pub struct SlowStore<S> {
    inner: S,
    delay: Duration,
}

impl<S> SlowStore<S> {
    /// Wraps `inner`, delaying every call by `delay`.
    pub fn new(inner: S, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

impl<S: BlobStore> BlobStore for SlowStore<S> {
    async fn put(&self, bytes: Bytes) -> Result<Cid> {
        tokio::time::sleep(self.delay).await;
        self.inner.put(bytes).await
    }

    async fn get(&self, cid: &Cid) -> Result<Bytes> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(cid).await
    }

    async fn has(&self, cid: &Cid) -> Result<bool> {
        tokio::time::sleep(self.delay).await;
        self.inner.has(cid).await
    }
}
