// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! Sequential stream assembly.

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use chaff_store::{BlobStore, Cid};

use crate::{Descriptor, Result, xor3_bytes};

/// Resolves cids to block bytes during assembly.
///
/// The blanket implementation forwards to [`BlobStore::get`]; richer callers
/// (a cache-first pipeline, a retrying fetcher) provide their own.
pub trait BlockFetcher: Send + Sync {
    /// Fetches the bytes addressed by `cid`.
    fn fetch(&self, cid: &Cid) -> impl Future<Output = chaff_store::Result<Bytes>> + Send;
}

impl<S: BlobStore> BlockFetcher for S {
    fn fetch(&self, cid: &Cid) -> impl Future<Output = chaff_store::Result<Bytes>> + Send {
        self.get(cid)
    }
}

/// Reconstructs a file from its descriptor, one block at a time.
///
/// The single-worker reference path: fetches each triple in order, XORs the
/// three blocks, trims the final block to the recorded file size, and writes
/// the result. Memory stays bounded by one triple regardless of file size.
/// The parallel download pipeline supersedes this for bulk transfers; tests
/// and diagnostics keep using it because its behavior is trivially ordered.
///
/// Returns the number of payload bytes written.
///
/// # Errors
///
/// Fails on the first fetch error, XOR length disagreement, or sink error.
/// Nothing is rolled back; the sink may have received a prefix of the file.
pub async fn assemble_stream<W, F>(
    writer: &mut W,
    descriptor: &Descriptor,
    fetcher: &F,
) -> Result<u64>
where
    W: AsyncWrite + Unpin + Send,
    F: BlockFetcher,
{
    descriptor.require_native_block_size()?;

    let mut written = 0u64;
    for (index, triple) in descriptor.blocks().iter().enumerate() {
        let data = fetcher.fetch(&triple.data).await?;
        let rand1 = fetcher.fetch(&triple.rand1).await?;
        let rand2 = fetcher.fetch(&triple.rand2).await?;

        let mut plain = xor3_bytes(&data, &rand1, &rand2)?;
        let keep = descriptor.payload_len(index as u64) as usize;
        plain.truncate(keep);

        writer.write_all(&plain).await?;
        written += plain.len() as u64;
    }

    writer.flush().await?;
    Ok(written)
}
