// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! The streaming upload pipeline.
//!
//! One reader task splits the source and feeds a bounded channel; `W`
//! workers anonymize and store blocks; a collector reassembles triples in
//! index order. The work channel's capacity equals the worker count, so
//! in-flight memory stays around `W * BLOCK_SIZE` no matter how large the
//! source is.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tracing::debug;

use chaff_block::{BLOCK_SIZE, Block, BlockSplitter, DescriptorBuilder, Triple, xor3};
use chaff_cache::Origin;
use chaff_store::{BlobStore, Cid};

use crate::client::Shared;
use crate::retry::{has_with_deadline, put_with_deadline};
use crate::{CancelToken, Error, Result};

pub(crate) async fn run_upload<S, R>(
    shared: Arc<Shared<S>>,
    reader: R,
    filename: &str,
    cancel: CancelToken,
) -> Result<Cid>
where
    S: BlobStore + Clone + Send + Sync + 'static,
    R: AsyncRead + Unpin + Send,
{
    let workers = shared.config.upload_workers.max(1);
    let (work_tx, work_rx) = mpsc::channel::<(u64, Block)>(workers);
    let work_rx = Arc::new(tokio::sync::Mutex::new(work_rx));
    let (result_tx, mut result_rx) = mpsc::channel::<(u64, Triple)>(workers);

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        handles.push(tokio::spawn(upload_worker(
            Arc::clone(&shared),
            Arc::clone(&work_rx),
            result_tx.clone(),
            cancel.clone(),
        )));
    }
    drop(result_tx);

    let collector = tokio::spawn(async move {
        let mut triples = BTreeMap::new();
        while let Some((index, triple)) = result_rx.recv().await {
            triples.insert(index, triple);
        }
        triples
    });

    // Split and feed from this task; backpressure from the bounded channel
    // is what keeps memory flat.
    let mut splitter = BlockSplitter::new(reader);
    let mut block_count = 0u64;
    let feed_result: Result<()> = loop {
        if let Err(e) = cancel.check() {
            break Err(e);
        }
        match splitter.next_block().await {
            Ok(Some(block)) => {
                if work_tx.send((block_count, block)).await.is_err() {
                    // All workers are gone; their join results carry the
                    // reason.
                    break Ok(());
                }
                block_count += 1;
            }
            Ok(None) => break Ok(()),
            Err(e) => break Err(e.into()),
        }
    };
    if feed_result.is_err() {
        cancel.cancel();
    }
    drop(work_tx);

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
    let mut triples = collector
        .await
        .map_err(|join| Error::Task(join.to_string()))?;

    // Worker failures outrank the feeder's `Cancelled` echo of them.
    if let Some(error) = worker_error {
        return Err(error);
    }
    feed_result?;
    cancel.check()?;

    let file_size = splitter.bytes_read();
    let mut builder = DescriptorBuilder::new(filename);
    for index in 0..block_count {
        let triple = triples
            .remove(&index)
            .ok_or_else(|| Error::Task(format!("no triple for block {index}")))?;
        builder.push(triple);
    }
    let descriptor = builder.build(file_size)?;

    let wire = descriptor.encode()?;
    let descriptor_cid =
        put_with_deadline(&shared.store, wire, shared.config.store_timeout()).await?;

    shared.metrics.record_source_bytes(file_size);
    debug!(
        %descriptor_cid,
        file_size,
        blocks = block_count,
        "upload complete"
    );
    Ok(descriptor_cid)
}

async fn upload_worker<S>(
    shared: Arc<Shared<S>>,
    work_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<(u64, Block)>>>,
    result_tx: mpsc::Sender<(u64, Triple)>,
    cancel: CancelToken,
) -> Result<()>
where
    S: BlobStore + Clone + Send + Sync + 'static,
{
    loop {
        let item = { work_rx.lock().await.recv().await };
        let Some((index, block)) = item else {
            return Ok(());
        };
        // After cancellation, keep draining so the feeder never blocks on a
        // full channel; the items are dropped unprocessed.
        if cancel.is_cancelled() {
            continue;
        }

        match anonymize_block(&shared, index, &block).await {
            Ok(triple) => {
                if result_tx.send((index, triple)).await.is_err() {
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

async fn anonymize_block<S>(shared: &Shared<S>, index: u64, source: &Block) -> Result<Triple>
where
    S: BlobStore + Clone + Send + Sync + 'static,
{
    let deadline = shared.config.store_timeout();
    let [r1, r2] = shared.pool.select_two().await?;

    let anonymized = xor3(source, &r1.block, &r2.block);
    let data_cid =
        put_with_deadline(&shared.store, anonymized.as_bytes().clone(), deadline).await?;

    // Promotion already stored fresh randomizers; for reused ones, re-put if
    // the best-effort probe cannot confirm them (`has` may lie with false
    // negatives, and `put` is idempotent, so re-putting is always safe).
    for randomizer in [&r1, &r2] {
        if !randomizer.freshly_promoted
            && !has_with_deadline(&shared.store, &randomizer.cid, deadline).await
        {
            put_with_deadline(
                &shared.store,
                randomizer.block.as_bytes().clone(),
                deadline,
            )
            .await?;
        }
    }

    if let Err(error) = shared
        .cache
        .store(&data_cid, anonymized.into_bytes(), Origin::Personal)
    {
        debug!(%data_cid, %error, "skipping cache insert for uploaded block");
    }

    shared
        .metrics
        .record_anonymized_block(&data_cid, BLOCK_SIZE as u64);
    let reused = [&r1, &r2]
        .iter()
        .filter(|r| !r.freshly_promoted)
        .count() as u64;
    shared.metrics.record_randomizer_reuses(reused);

    Ok(Triple::new(data_cid, r1.cid, r2.cid, index)?)
}
