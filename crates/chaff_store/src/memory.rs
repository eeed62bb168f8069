// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! In-memory blob store.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::{BlobStore, Cid, Error, Result, content_id};

/// A BLAKE3-addressed in-memory blob store.
///
/// The reference [`BlobStore`] implementation: blobs live in a process-local
/// map keyed by [`content_id`]. `put` is idempotent and `has` never returns
/// false negatives here, though callers must not rely on that; the contract
/// allows them.
///
/// Cloning is cheap and clones share the same underlying map.
///
/// # Examples
///
/// ```
/// use chaff_store::{BlobStore, MemoryBlobStore};
/// # futures::executor::block_on(async {
///
/// let store = MemoryBlobStore::new();
/// let cid = store.put(bytes::Bytes::from_static(b"payload")).await?;
/// let again = store.put(bytes::Bytes::from_static(b"payload")).await?;
///
/// assert_eq!(cid, again);
/// assert_eq!(store.len(), 1);
/// # Ok::<(), chaff_store::Error>(())
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<Cid, Bytes>>>,
}

impl MemoryBlobStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of distinct blobs held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Returns `true` if the store holds no blobs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    /// Returns the total number of bytes held across all blobs.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.blobs.read().values().map(|b| b.len() as u64).sum()
    }
}

impl BlobStore for MemoryBlobStore {
    async fn put(&self, bytes: Bytes) -> Result<Cid> {
        let cid = content_id(&bytes);
        self.blobs.write().entry(cid.clone()).or_insert(bytes);
        Ok(cid)
    }

    async fn get(&self, cid: &Cid) -> Result<Bytes> {
        self.blobs
            .read()
            .get(cid)
            .cloned()
            .ok_or_else(|| Error::NotFound { cid: cid.clone() })
    }

    async fn has(&self, cid: &Cid) -> Result<bool> {
        Ok(self.blobs.read().contains_key(cid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_is_idempotent() {
        let store = MemoryBlobStore::new();
        let a = store.put(Bytes::from_static(b"blob")).await.expect("put");
        let b = store.put(Bytes::from_static(b"blob")).await.expect("put");
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = MemoryBlobStore::new();
        let err = store.get(&Cid::from("nope")).await.expect_err("missing");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn clones_share_contents() {
        let store = MemoryBlobStore::new();
        let clone = store.clone();
        let cid = store.put(Bytes::from_static(b"shared")).await.expect("put");
        assert!(clone.has(&cid).await.expect("has"));
    }

    #[tokio::test]
    async fn round_trips_bytes_exactly() {
        let store = MemoryBlobStore::new();
        let payload = Bytes::from((0u8..=255).collect::<Vec<_>>());
        let cid = store.put(payload.clone()).await.expect("put");
        assert_eq!(store.get(&cid).await.expect("get"), payload);
    }
}
