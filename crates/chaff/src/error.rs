// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! The facade error taxonomy.

use thiserror::Error;

use chaff_store::Cid;

/// Any error surfaced by the chaff client.
///
/// Component errors pass through transparently so callers can match on the
/// underlying taxonomy; the variants added here are pipeline-level
/// conditions that no single component owns.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Reading the source or writing the sink failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A block codec or descriptor failure.
    #[error(transparent)]
    Codec(#[from] chaff_block::Error),

    /// A randomizer pool failure.
    #[error(transparent)]
    Pool(#[from] chaff_pool::Error),

    /// A cache admission failure.
    #[error(transparent)]
    Cache(#[from] chaff_cache::Error),

    /// A blob store failure other than a resolvable missing block.
    #[error(transparent)]
    Store(#[from] chaff_store::Error),

    /// A block needed for reconstruction is missing or unusable, including
    /// after the configured retries.
    #[error("block unavailable: {cid}")]
    BlockUnavailable {
        /// The cid that could not be resolved to a usable block.
        cid: Cid,
    },

    /// The requested byte range does not lie within the file.
    #[error("invalid byte range [{start}, {end}) for file of {file_size} bytes")]
    InvalidRange {
        /// Inclusive range start.
        start: u64,
        /// Exclusive range end.
        end: u64,
        /// The file's size per its descriptor.
        file_size: u64,
    },

    /// The operation was cancelled through its [`CancelToken`][crate::CancelToken].
    #[error("operation cancelled")]
    Cancelled,

    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A pipeline task terminated abnormally (panic or runtime shutdown).
    #[error("pipeline task failed: {0}")]
    Task(String),
}

/// A specialized [`Result`] for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    #[test]
    fn thread_safe_type() {
        assert_impl_all!(Error: Send, Sync);
    }

    #[test]
    fn component_errors_convert_transparently() {
        let cache_err = chaff_cache::Error::CapacityExceeded {
            size: 10,
            capacity: 5,
        };
        let err: Error = cache_err.into();
        assert!(matches!(err, Error::Cache(_)));

        let store_err = chaff_store::Error::NotFound {
            cid: Cid::from("x"),
        };
        let err: Error = store_err.into();
        assert!(matches!(err, Error::Store(_)));
    }
}
