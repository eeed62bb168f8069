// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! Blob store trait.

use bytes::Bytes;

use crate::{Cid, Result};

/// A content-addressed blob store.
///
/// Implementations are external collaborators (a DHT, an IPFS gateway, a
/// test double); the core only relies on this contract:
///
/// - `put` is idempotent: identical bytes yield the identical cid.
/// - `get` returns exactly the bytes that produced the cid, or fails.
/// - `has` is best-effort and may return false negatives, never false
///   positives.
///
/// Implementations must be safe to call from many tasks concurrently.
pub trait BlobStore: Send + Sync {
    /// Stores a byte sequence and returns its content identifier.
    fn put(&self, bytes: Bytes) -> impl Future<Output = Result<Cid>> + Send;

    /// Resolves a cid to the bytes it addresses.
    fn get(&self, cid: &Cid) -> impl Future<Output = Result<Bytes>> + Send;

    /// Probes for the presence of a blob.
    ///
    /// A `false` answer does not prove absence.
    fn has(&self, cid: &Cid) -> impl Future<Output = Result<bool>> + Send;
}

impl<S: BlobStore> BlobStore for std::sync::Arc<S> {
    fn put(&self, bytes: Bytes) -> impl Future<Output = Result<Cid>> + Send {
        S::put(self, bytes)
    }

    fn get(&self, cid: &Cid) -> impl Future<Output = Result<Bytes>> + Send {
        S::get(self, cid)
    }

    fn has(&self, cid: &Cid) -> impl Future<Output = Result<bool>> + Send {
        S::has(self, cid)
    }
}

impl<S: BlobStore> BlobStore for &S {
    fn put(&self, bytes: Bytes) -> impl Future<Output = Result<Cid>> + Send {
        S::put(self, bytes)
    }

    fn get(&self, cid: &Cid) -> impl Future<Output = Result<Bytes>> + Send {
        S::get(self, cid)
    }

    fn has(&self, cid: &Cid) -> impl Future<Output = Result<bool>> + Send {
        S::has(self, cid)
    }
}
