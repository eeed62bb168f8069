// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! Fixed-size block codec and file descriptors.
//!
//! A file entering chaff is cut into [`BLOCK_SIZE`] chunks, the final chunk
//! zero-padded, and each chunk anonymized by XOR with two randomizer blocks:
//! `stored = source ^ r1 ^ r2`. Because XOR is an involution, reconstruction
//! is the same operation over the recorded triple. The [`Descriptor`] is the
//! manifest that makes reconstruction possible: original size, block size,
//! and the ordered cid triples.
//!
//! The codec is stateless. Blocks carry no headers, and every [`Block`] is
//! exactly [`BLOCK_SIZE`] bytes. Uniformity is a privacy property, not an
//! optimization target.

mod assemble;
mod block;
mod codec;
mod descriptor;

pub use assemble::{BlockFetcher, assemble_stream};
pub use block::{BLOCK_SIZE, Block};
pub use codec::{BlockSplitter, xor3, xor3_bytes};
pub use descriptor::{Descriptor, DescriptorBuilder, Triple};

use thiserror::Error;

/// Any error that may arise from the block codec or descriptor handling.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A byte sequence with a length other than [`BLOCK_SIZE`] reached an
    /// operation that requires full blocks. This is a programming error in
    /// the caller, not a data error.
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// The required length.
        expected: usize,
        /// The offending length.
        actual: usize,
    },

    /// Reading the source or writing the sink failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The descriptor byte stream ended before the announced content.
    #[error("descriptor truncated while reading {context}")]
    Truncated {
        /// What was being read when the bytes ran out.
        context: &'static str,
    },

    /// A length-prefixed string was not valid UTF-8.
    #[error("descriptor field {context} is not valid UTF-8")]
    InvalidUtf8 {
        /// The field being decoded.
        context: &'static str,
    },

    /// A cid exceeded the wire-format length bound.
    #[error("cid of {len} bytes exceeds the {max} byte bound")]
    CidTooLong {
        /// The offending length.
        len: usize,
        /// The enforced bound.
        max: usize,
    },

    /// A triple listed the same cid for both randomizers; equal randomizers
    /// cancel under XOR and would expose the source block.
    #[error("triple {index} repeats randomizer {cid}")]
    DuplicateRandomizers {
        /// The zero-based triple index.
        index: u64,
        /// The repeated cid.
        cid: chaff_store::Cid,
    },

    /// The block count disagrees with `ceil(file_size / block_size)`.
    #[error("descriptor lists {listed} blocks but the file size requires {required}")]
    BlockCountMismatch {
        /// Blocks present in the descriptor.
        listed: u64,
        /// Blocks implied by the file and block sizes.
        required: u64,
    },

    /// The descriptor carries a block size this build does not support.
    #[error("unsupported block size {actual} (this build uses {supported})")]
    UnsupportedBlockSize {
        /// The block size announced by the descriptor.
        actual: u32,
        /// The compiled-in block size.
        supported: u32,
    },

    /// Bytes remained after the announced descriptor content.
    #[error("{0} trailing bytes after descriptor content")]
    TrailingBytes(usize),

    /// A field did not fit its wire representation.
    #[error("descriptor field {context} exceeds its wire bound")]
    FieldTooLarge {
        /// The field being encoded.
        context: &'static str,
    },

    /// Fetching a block during assembly failed.
    #[error(transparent)]
    Fetch(#[from] chaff_store::Error),

    /// The canonical-JSON alternative encoding failed.
    #[cfg(feature = "json")]
    #[error("descriptor JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized [`Result`] for codec operations.
pub type Result<T> = std::result::Result<T, Error>;
