// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! Byte-range download semantics.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use chaff::{BLOCK_SIZE, Client, Descriptor, Error};
use chaff_store::{BlobStore, Cid, MemoryBlobStore};

use common::{client_over, content, memory_client, test_config};

/// Wraps the memory store and records every cid fetched, so tests can
/// assert which blocks a range download actually touched.
#[derive(Debug, Clone)]
struct CountingStore {
    inner: MemoryBlobStore,
    fetched: Arc<Mutex<Vec<Cid>>>,
}

impl CountingStore {
    fn new(inner: MemoryBlobStore) -> Self {
        Self {
            inner,
            fetched: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn fetched(&self) -> Vec<Cid> {
        self.fetched.lock().clone()
    }
}

impl BlobStore for CountingStore {
    async fn put(&self, bytes: Bytes) -> chaff_store::Result<Cid> {
        self.inner.put(bytes).await
    }

    async fn get(&self, cid: &Cid) -> chaff_store::Result<Bytes> {
        self.fetched.lock().push(cid.clone());
        self.inner.get(cid).await
    }

    async fn has(&self, cid: &Cid) -> chaff_store::Result<bool> {
        self.inner.has(cid).await
    }
}

#[tokio::test]
async fn range_download_returns_exactly_the_requested_slice() {
    let client = memory_client().await;
    let source = content(1, 1024 * 1024);

    let handle = client.upload(source.as_slice(), "large.bin").await.expect("upload");

    let (start, end) = (130_000u64, 260_000u64);
    let mut slice = Vec::new();
    let written = client
        .download_range(&handle, &mut slice, start..end)
        .await
        .expect("range download");

    assert_eq!(written, end - start);
    assert_eq!(slice, source[start as usize..end as usize]);
}

#[tokio::test]
async fn range_download_fetches_only_intersecting_blocks() {
    // Upload through a plain client, download through a counting store so
    // only the download's fetches are observed.
    let backing = MemoryBlobStore::new();
    let uploader = client_over(backing.clone()).await;
    let source = content(2, 1024 * 1024);
    let handle = uploader.upload(source.as_slice(), "counted.bin").await.expect("upload");

    let wire = backing.get(&handle).await.expect("descriptor");
    let descriptor = Descriptor::decode(&wire).expect("decodes");

    let counting = CountingStore::new(backing);
    let downloader = Client::builder(counting.clone())
        .config(test_config())
        .build()
        .await
        .expect("client");

    let mut slice = Vec::new();
    downloader
        .download_range(&handle, &mut slice, 130_000..260_000)
        .await
        .expect("range download");

    // [130000, 260000) spans blocks 0 and 1 of eight; exactly those two
    // data blocks may be fetched.
    let data_cids: Vec<&Cid> = descriptor.blocks().iter().map(|t| &t.data).collect();
    let fetched: HashSet<Cid> = counting.fetched().into_iter().collect();
    let fetched_data: Vec<usize> = data_cids
        .iter()
        .enumerate()
        .filter(|(_, cid)| fetched.contains(cid))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(fetched_data, vec![0, 1]);
}

#[tokio::test]
async fn ranges_align_with_block_boundaries() {
    let client = memory_client().await;
    let source = content(3, 3 * BLOCK_SIZE + 17);
    let handle = client.upload(source.as_slice(), "edges.bin").await.expect("upload");

    let bs = BLOCK_SIZE as u64;
    let file_size = source.len() as u64;
    for range in [
        0..1,                       // first byte
        bs - 1..bs + 1,             // straddles the first boundary
        bs..2 * bs,                 // exactly one interior block
        2 * bs + 5..file_size,      // into the padded tail
        file_size - 1..file_size,   // last byte
        0..file_size,               // everything
    ] {
        let mut slice = Vec::new();
        client
            .download_range(&handle, &mut slice, range.clone())
            .await
            .expect("range download");
        assert_eq!(
            slice,
            source[range.start as usize..range.end as usize],
            "range {range:?} must be byte-exact"
        );
    }
}

#[tokio::test]
async fn empty_range_writes_nothing() {
    let client = memory_client().await;
    let source = content(4, 1000);
    let handle = client.upload(source.as_slice(), "empty-range.bin").await.expect("upload");

    let mut slice = Vec::new();
    let written = client
        .download_range(&handle, &mut slice, 500..500)
        .await
        .expect("empty range");
    assert_eq!(written, 0);
    assert!(slice.is_empty());
}

#[tokio::test]
async fn out_of_bounds_ranges_are_rejected() {
    let client = memory_client().await;
    let source = content(5, 1000);
    let handle = client.upload(source.as_slice(), "bounds.bin").await.expect("upload");

    let mut sink = Vec::new();
    let err = client
        .download_range(&handle, &mut sink, 0..1001)
        .await
        .expect_err("past the end");
    assert!(matches!(
        err,
        Error::InvalidRange {
            end: 1001,
            file_size: 1000,
            ..
        }
    ));

    let err = client
        .download_range(&handle, &mut sink, 800..700)
        .await
        .expect_err("inverted");
    assert!(matches!(err, Error::InvalidRange { .. }));
    assert!(sink.is_empty(), "nothing may reach the sink");
}
