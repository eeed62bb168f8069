// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! Privacy-preserving object store core.
//!
//! chaff layers an OFFSystem-style anonymized object store over any
//! content-addressed blob network. A file is split into fixed-size blocks;
//! each block is XORed with two randomizer blocks drawn from a shared
//! universal pool before it is stored, so every stored block is
//! statistically indistinguishable from random data and, because
//! randomizers are reused across files, no stored block belongs to any one
//! file. A compact descriptor records the cid triples needed to XOR a file
//! back together.
//!
//! The [`Client`] facade composes the pieces: the block codec and
//! descriptors ([`chaff_block`]), the randomizer pool ([`chaff_pool`]), the
//! partitioned local cache ([`chaff_cache`]), and the blob store boundary
//! ([`chaff_store`]), driven by bounded-memory parallel upload and download
//! pipelines.
//!
//! # Examples
//!
//! ```
//! use chaff::{Client, Config};
//! use chaff_store::MemoryBlobStore;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), chaff::Error> {
//! let config = Config::new(64 * 1024 * 1024, 16 * 1024 * 1024);
//! let client = Client::builder(MemoryBlobStore::new())
//!     .config(config)
//!     .build()
//!     .await?;
//!
//! let source = b"the bytes to hide in plain sight".to_vec();
//! let handle = client.upload(source.as_slice(), "note.txt").await?;
//!
//! let mut restored = Vec::new();
//! client.download(&handle, &mut restored).await?;
//! assert_eq!(restored, source);
//! # Ok(())
//! # }
//! ```

mod cancel;
mod client;
mod config;
mod download;
mod error;
mod metrics;
mod retry;
mod upload;

pub use cancel::CancelToken;
pub use client::{Client, ClientBuilder};
pub use config::{CacheConfig, Config, DownloadConfig, EvictionStrategyKind, PoolConfig};
pub use error::{Error, Result};
pub use metrics::MetricsSnapshot;

// The vocabulary types callers need alongside the facade.
pub use chaff_block::{BLOCK_SIZE, Block, Descriptor, Triple};
pub use chaff_cache::{CacheStats, HealthHint, Origin, ReplicationBucket};
pub use chaff_store::{BlobStore, Cid};
