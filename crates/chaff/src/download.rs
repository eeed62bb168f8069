// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! The streaming download pipeline.
//!
//! The descriptor names the triples; `W` workers fetch and XOR the blocks
//! that intersect the requested byte range, checking the local cache before
//! the blob store; the writer consumes reconstructed blocks strictly in
//! index order, buffering out-of-order completions in a reorder window and
//! slicing the first and last block to the range.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

use chaff_block::{BLOCK_SIZE, Descriptor, Triple, xor3_bytes};
use chaff_cache::Origin;
use chaff_store::{BlobStore, Cid};

use crate::client::Shared;
use crate::retry::get_with_retry;
use crate::{CancelToken, Error, Result};

pub(crate) async fn run_download<S, W>(
    shared: Arc<Shared<S>>,
    descriptor_cid: &Cid,
    writer: &mut W,
    range: Option<Range<u64>>,
    cancel: CancelToken,
) -> Result<u64>
where
    S: BlobStore + Clone + Send + Sync + 'static,
    W: AsyncWrite + Unpin + Send,
{
    cancel.check()?;
    let descriptor = fetch_descriptor(&shared, descriptor_cid).await?;
    let file_size = descriptor.file_size();

    let (start, end) = match range {
        Some(range) => {
            if range.start > range.end || range.end > file_size {
                return Err(Error::InvalidRange {
                    start: range.start,
                    end: range.end,
                    file_size,
                });
            }
            (range.start, range.end)
        }
        None => (0, file_size),
    };
    if start == end {
        return Ok(0);
    }

    let block_range = descriptor.blocks_for_byte_range(start, end);
    debug!(
        %descriptor_cid,
        start,
        end,
        blocks = block_range.end - block_range.start,
        "download begins"
    );

    let workers = shared.config.download_workers.max(1);
    let (work_tx, work_rx) = mpsc::channel::<(u64, Triple)>(workers);
    let work_rx = Arc::new(tokio::sync::Mutex::new(work_rx));
    let (result_tx, mut result_rx) = mpsc::channel::<(u64, Vec<u8>)>(workers);

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        handles.push(tokio::spawn(download_worker(
            Arc::clone(&shared),
            Arc::clone(&work_rx),
            result_tx.clone(),
            cancel.clone(),
        )));
    }
    drop(result_tx);

    let feeder = {
        let triples: Vec<(u64, Triple)> = descriptor.blocks()
            [block_range.start as usize..block_range.end as usize]
            .iter()
            .cloned()
            .enumerate()
            .map(|(offset, triple)| (block_range.start + offset as u64, triple))
            .collect();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            for item in triples {
                if cancel.is_cancelled() || work_tx.send(item).await.is_err() {
                    break;
                }
            }
        })
    };

    // This task is the ordered writer.
    let mut pending: BTreeMap<u64, Vec<u8>> = BTreeMap::new();
    let mut next_index = block_range.start;
    let mut written = 0u64;
    let write_result: Result<()> = loop {
        if next_index >= block_range.end {
            break Ok(());
        }
        let Some((index, bytes)) = result_rx.recv().await else {
            // Workers are gone before the range completed; their join
            // results explain why.
            break Ok(());
        };
        if cancel.is_cancelled() {
            // Drain without writing: nothing reaches the sink after
            // cancellation is observed.
            continue;
        }
        pending.insert(index, bytes);

        while let Some(block) = pending.remove(&next_index) {
            let slice = range_within_block(&descriptor, next_index, start, end);
            written += slice.len() as u64;
            writer.write_all(&block[slice]).await?;
            next_index += 1;
            if next_index >= block_range.end {
                break;
            }
        }
    };
    if write_result.is_err() {
        cancel.cancel();
    }
    // Unblocks any worker still waiting to hand over a result.
    drop(result_rx);

    let mut worker_error = None;
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                cancel.cancel();
                worker_error.get_or_insert(e);
            }
            Err(join) => {
                cancel.cancel();
                worker_error.get_or_insert(Error::Task(join.to_string()));
            }
        }
    }
    feeder.await.map_err(|join| Error::Task(join.to_string()))?;

    if let Some(error) = worker_error {
        return Err(error);
    }
    write_result?;
    cancel.check()?;

    if next_index < block_range.end {
        // Workers exited cleanly without covering the range; this is a
        // pipeline bug, not an I/O condition.
        return Err(Error::Task(format!(
            "download stalled at block {next_index} of {}",
            block_range.end
        )));
    }

    writer.flush().await?;
    debug!(%descriptor_cid, written, "download complete");
    Ok(written)
}

async fn fetch_descriptor<S>(shared: &Shared<S>, descriptor_cid: &Cid) -> Result<Descriptor>
where
    S: BlobStore + Clone + Send + Sync + 'static,
{
    let wire = get_with_retry(
        &shared.store,
        descriptor_cid,
        shared.config.store_timeout(),
        shared.config.download.retry_attempts,
        shared.config.retry_backoff_base(),
    )
    .await
    .map_err(|error| promote_not_found(error, descriptor_cid))?;

    let descriptor = Descriptor::decode(&wire)?;
    descriptor.require_native_block_size()?;
    Ok(descriptor)
}

async fn download_worker<S>(
    shared: Arc<Shared<S>>,
    work_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<(u64, Triple)>>>,
    result_tx: mpsc::Sender<(u64, Vec<u8>)>,
    cancel: CancelToken,
) -> Result<()>
where
    S: BlobStore + Clone + Send + Sync + 'static,
{
    loop {
        let item = { work_rx.lock().await.recv().await };
        let Some((index, triple)) = item else {
            return Ok(());
        };
        if cancel.is_cancelled() {
            continue;
        }

        match reconstruct_block(&shared, &triple).await {
            Ok(bytes) => {
                if result_tx.send((index, bytes)).await.is_err() {
                    return Ok(());
                }
            }
            Err(error) => {
                cancel.cancel();
                return Err(error);
            }
        }
    }
}

async fn reconstruct_block<S>(shared: &Shared<S>, triple: &Triple) -> Result<Vec<u8>>
where
    S: BlobStore + Clone + Send + Sync + 'static,
{
    let data = fetch_block(shared, &triple.data, false).await?;
    let rand1 = fetch_block(shared, &triple.rand1, true).await?;
    let rand2 = fetch_block(shared, &triple.rand2, true).await?;
    Ok(xor3_bytes(&data, &rand1, &rand2)?)
}

/// Resolves one block, cache first. Fetched blocks are cached best-effort
/// so that nearby range reads stay local.
async fn fetch_block<S>(shared: &Shared<S>, cid: &Cid, is_randomizer: bool) -> Result<Bytes>
where
    S: BlobStore + Clone + Send + Sync + 'static,
{
    if let Some(bytes) = shared.cache.get(cid) {
        if bytes.len() == BLOCK_SIZE {
            return Ok(bytes);
        }
        // A non-block payload under a block cid cannot participate in XOR;
        // drop it and refetch.
        shared.cache.remove(cid);
    }

    let bytes = get_with_retry(
        &shared.store,
        cid,
        shared.config.store_timeout(),
        shared.config.download.retry_attempts,
        shared.config.retry_backoff_base(),
    )
    .await
    .map_err(|error| promote_not_found(error, cid))?;

    if bytes.len() != BLOCK_SIZE {
        // The store returned something that cannot be this block.
        return Err(Error::BlockUnavailable { cid: cid.clone() });
    }

    let cached = if is_randomizer {
        shared
            .cache
            .store_randomizer(cid, bytes.clone(), Origin::Personal)
    } else {
        shared.cache.store(cid, bytes.clone(), Origin::Personal)
    };
    if let Err(error) = cached {
        debug!(%cid, %error, "skipping cache insert for fetched block");
    }

    Ok(bytes)
}

fn promote_not_found(error: chaff_store::Error, cid: &Cid) -> Error {
    if error.is_not_found() {
        Error::BlockUnavailable { cid: cid.clone() }
    } else {
        Error::Store(error)
    }
}

fn range_within_block(
    descriptor: &Descriptor,
    index: u64,
    start: u64,
    end: u64,
) -> Range<usize> {
    let bs = u64::from(descriptor.block_size());
    let block_start = index * bs;
    let from = start.max(block_start) - block_start;
    let to = end.min(block_start + bs) - block_start;
    from as usize..to as usize
}
