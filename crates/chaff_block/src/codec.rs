// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! Stream splitting and 3-tuple XOR.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{BLOCK_SIZE, Block, Error, Result};

/// Cuts an async byte stream into [`BLOCK_SIZE`] blocks.
///
/// Blocks are emitted as soon as they fill; the splitter never buffers more
/// than one block. The final short chunk is zero-padded, and
/// [`bytes_read`](Self::bytes_read) reports the unpadded source length for
/// the descriptor.
///
/// # Examples
///
/// ```
/// use chaff_block::{BLOCK_SIZE, BlockSplitter};
/// # futures::executor::block_on(async {
///
/// let source: &[u8] = &[0xAB; BLOCK_SIZE + 10];
/// let mut splitter = BlockSplitter::new(source);
///
/// assert!(splitter.next_block().await?.is_some()); // full block
/// assert!(splitter.next_block().await?.is_some()); // padded tail
/// assert!(splitter.next_block().await?.is_none()); // EOF
/// assert_eq!(splitter.bytes_read(), (BLOCK_SIZE + 10) as u64);
/// # Ok::<(), chaff_block::Error>(())
/// # });
/// ```
#[derive(Debug)]
pub struct BlockSplitter<R> {
    reader: R,
    bytes_read: u64,
    finished: bool,
}

impl<R: AsyncRead + Unpin> BlockSplitter<R> {
    /// Wraps a reader for splitting.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            bytes_read: 0,
            finished: false,
        }
    }

    /// Reads the next block, or `None` at end of input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the underlying reader fails; the splitter is
    /// unusable afterwards.
    pub async fn next_block(&mut self) -> Result<Option<Block>> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = BytesMut::zeroed(BLOCK_SIZE);
        let mut filled = 0;
        while filled < BLOCK_SIZE {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                self.finished = true;
                break;
            }
            filled += n;
        }

        if filled == 0 {
            return Ok(None);
        }

        self.bytes_read += filled as u64;
        // The unwritten tail of `buf` is already zero, which is exactly the
        // padding policy.
        Ok(Some(Block::from_bytes(buf.freeze())?))
    }

    /// Total unpadded bytes consumed from the reader so far.
    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

/// XORs three blocks bytewise.
///
/// This single operation is both directions of the codec: anonymization is
/// `xor3(source, r1, r2)` and reconstruction is `xor3(stored, r1, r2)`.
/// Pure and infallible: the [`Block`] type already guarantees equal
/// lengths.
///
/// # Examples
///
/// ```
/// use chaff_block::{Block, xor3};
///
/// let source = Block::from_partial(b"secret")?;
/// let r1 = Block::from_partial(&[0x55; 32])?;
/// let r2 = Block::from_partial(&[0xAA; 32])?;
///
/// let stored = xor3(&source, &r1, &r2);
/// assert_eq!(xor3(&stored, &r1, &r2), source);
/// # Ok::<(), chaff_block::Error>(())
/// ```
#[must_use]
pub fn xor3(a: &Block, b: &Block, c: &Block) -> Block {
    let mut out = BytesMut::with_capacity(BLOCK_SIZE);
    out.extend(
        a.as_slice()
            .iter()
            .zip(b.as_slice())
            .zip(c.as_slice())
            .map(|((x, y), z)| x ^ y ^ z),
    );
    Block::from_full(out.freeze())
}

/// XORs three equal-length byte slices.
///
/// The slice form used where full [`Block`]s are not in hand (wire tests,
/// integrity probes).
///
/// # Errors
///
/// Returns [`Error::SizeMismatch`] unless all three lengths agree.
pub fn xor3_bytes(a: &[u8], b: &[u8], c: &[u8]) -> Result<Vec<u8>> {
    if a.len() != b.len() || b.len() != c.len() {
        return Err(Error::SizeMismatch {
            expected: a.len(),
            actual: if a.len() == b.len() { c.len() } else { b.len() },
        });
    }
    Ok(a.iter()
        .zip(b)
        .zip(c)
        .map(|((x, y), z)| x ^ y ^ z)
        .collect())
}
