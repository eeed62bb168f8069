// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! The blob store boundary of the chaff object store.
//!
//! Everything chaff persists (anonymized blocks, randomizers, descriptors)
//! goes through a content-addressed [`BlobStore`]: `put` hands bytes to the
//! network and receives a [`Cid`], `get` resolves a `Cid` back to bytes, and
//! `has` is a best-effort presence probe. The store is external to the core;
//! this crate defines the contract, the error taxonomy with
//! transient/permanent classification, and a BLAKE3-addressed in-memory
//! implementation used by tests and single-process deployments.
//!
//! # Examples
//!
//! ```
//! use chaff_store::{BlobStore, MemoryBlobStore};
//! # futures::executor::block_on(async {
//!
//! let store = MemoryBlobStore::new();
//! let cid = store.put(bytes::Bytes::from_static(b"hello")).await?;
//!
//! assert!(store.has(&cid).await?);
//! assert_eq!(store.get(&cid).await?, bytes::Bytes::from_static(b"hello"));
//! # Ok::<(), chaff_store::Error>(())
//! # });
//! ```

mod cid;
mod error;
#[cfg(feature = "memory")]
mod memory;
mod store;
#[cfg(feature = "test-util")]
pub mod testing;

pub use cid::{Cid, content_id};
pub use error::{Error, Result};
#[cfg(feature = "memory")]
pub use memory::MemoryBlobStore;
pub use store::BlobStore;
