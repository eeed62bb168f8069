// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! The fixed-size block type.

use bytes::{Bytes, BytesMut};

use crate::{Error, Result};

/// The size of every block in the system, in bytes.
///
/// Source chunks, randomizers, and anonymized blocks all share this size;
/// shorter final chunks are zero-padded before anonymization. Uniform sizing
/// is deliberate: a stored block's length must not leak anything about its
/// contents or position.
pub const BLOCK_SIZE: usize = 128 * 1024;

/// A block of exactly [`BLOCK_SIZE`] bytes.
///
/// The constructors enforce the length invariant, so holding a `Block` is
/// proof of it; operations over blocks (XOR, caching, pooling) need no
/// further length checks. The payload is a [`Bytes`], making clones cheap
/// and allocation-free.
///
/// # Examples
///
/// ```
/// use chaff_block::{BLOCK_SIZE, Block};
///
/// let block = Block::zeroed();
/// assert_eq!(block.as_slice().len(), BLOCK_SIZE);
///
/// let padded = Block::from_partial(b"short tail")?;
/// assert_eq!(&padded.as_slice()[..10], b"short tail");
/// assert!(padded.as_slice()[10..].iter().all(|&b| b == 0));
/// # Ok::<(), chaff_block::Error>(())
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Block {
    data: Bytes,
}

impl Block {
    /// Wraps a byte sequence that is already exactly [`BLOCK_SIZE`] long.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeMismatch`] for any other length.
    pub fn from_bytes(data: Bytes) -> Result<Self> {
        if data.len() != BLOCK_SIZE {
            return Err(Error::SizeMismatch {
                expected: BLOCK_SIZE,
                actual: data.len(),
            });
        }
        Ok(Self { data })
    }

    /// Zero-pads a chunk of at most [`BLOCK_SIZE`] bytes into a full block.
    ///
    /// The original length is not recorded here; trimming the pad on
    /// reconstruction is driven by the descriptor's file size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeMismatch`] if the chunk is longer than a block.
    pub fn from_partial(chunk: &[u8]) -> Result<Self> {
        if chunk.len() > BLOCK_SIZE {
            return Err(Error::SizeMismatch {
                expected: BLOCK_SIZE,
                actual: chunk.len(),
            });
        }
        if chunk.len() == BLOCK_SIZE {
            return Ok(Self {
                data: Bytes::copy_from_slice(chunk),
            });
        }
        let mut padded = BytesMut::zeroed(BLOCK_SIZE);
        padded[..chunk.len()].copy_from_slice(chunk);
        Ok(Self {
            data: padded.freeze(),
        })
    }

    /// Wraps bytes whose length the caller has already established.
    pub(crate) fn from_full(data: Bytes) -> Self {
        debug_assert_eq!(data.len(), BLOCK_SIZE);
        Self { data }
    }

    /// Returns the all-zero block.
    #[must_use]
    pub fn zeroed() -> Self {
        Self {
            data: BytesMut::zeroed(BLOCK_SIZE).freeze(),
        }
    }

    /// Returns the block contents as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Returns the block contents as shared bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &Bytes {
        &self.data
    }

    /// Consumes the block and returns its contents.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Block contents are deliberately opaque; printing 128 KiB of noise
        // into logs helps nobody.
        write!(f, "Block({} bytes)", self.data.len())
    }
}

impl TryFrom<Bytes> for Block {
    type Error = Error;

    fn try_from(data: Bytes) -> Result<Self> {
        Self::from_bytes(data)
    }
}
