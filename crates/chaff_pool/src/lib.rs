// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! The universal randomizer pool.
//!
//! Anonymization only provides deniability if randomizer blocks are shared:
//! a block that participates in reconstructing many unrelated files cannot
//! be attributed to any one of them. The pool is the long-lived set of such
//! blocks. Selection is biased toward already-popular randomizers
//! (deniability through shared use) with a uniform escape hatch for
//! diversity, and after the pool holds two entries every anonymization is
//! guaranteed to reuse at least one of them.
//!
//! Pool entries are never removed within a process run; reuse counts only
//! grow.
//!
//! # Examples
//!
//! ```
//! use chaff_pool::RandomizerPool;
//! use chaff_store::MemoryBlobStore;
//! use tick::Clock;
//! # futures::executor::block_on(async {
//!
//! let clock = Clock::new_frozen();
//! let pool = RandomizerPool::builder(MemoryBlobStore::new(), clock).build();
//! pool.seed(4).await?;
//!
//! let [r1, r2] = pool.select_two().await?;
//! assert_ne!(r1.cid, r2.cid);
//! assert_eq!(pool.len(), 4);
//! # Ok::<(), chaff_pool::Error>(())
//! # });
//! ```

mod entropy;
mod pool;

pub use entropy::EntropyGate;
pub use pool::{PoolBuilder, PoolEntrySnapshot, RandomizerPool, Selected};

use thiserror::Error;

/// Any error that may arise from pool operations.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Freshly generated blocks kept failing the entropy gate.
    ///
    /// With a healthy OS RNG this indicates a misconfigured gate, not bad
    /// luck; the retry bound exists so the failure is loud instead of a
    /// silent spin.
    #[error("could not generate an acceptable randomizer in {attempts} attempts")]
    GenerationFailed {
        /// How many candidate blocks were rejected.
        attempts: u32,
    },

    /// The operating system RNG is unavailable. Fatal: without entropy the
    /// system cannot anonymize anything.
    #[error("system RNG unavailable: {0}")]
    Rng(getrandom::Error),

    /// Registering a randomizer with the blob store failed.
    #[error(transparent)]
    Store(#[from] chaff_store::Error),
}

/// A specialized [`Result`] for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
