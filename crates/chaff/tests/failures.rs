// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! Failure semantics: missing blocks, transient faults, cancellation.

mod common;

use std::sync::Arc;

use chaff::{BLOCK_SIZE, CancelToken, Client, Error};
use chaff_store::testing::FlakyStore;
use chaff_store::{BlobStore, Cid, MemoryBlobStore};

use common::{client_over, content, memory_client, test_config};

#[tokio::test]
async fn missing_descriptor_is_block_unavailable() {
    let client = memory_client().await;

    let mut sink = Vec::new();
    let err = client
        .download(&Cid::from("no-such-descriptor"), &mut sink)
        .await
        .expect_err("nothing stored");
    assert!(matches!(err, Error::BlockUnavailable { .. }));
}

#[tokio::test]
async fn missing_blocks_fail_the_whole_download() {
    let uploader = memory_client().await;
    let source = content(1, 2 * BLOCK_SIZE);
    let handle = uploader.upload(source.as_slice(), "orphaned.bin").await.expect("upload");

    // A store holding only the descriptor: every block fetch must fail.
    let wire = uploader.store().get(&handle).await.expect("descriptor");
    let bare = MemoryBlobStore::new();
    let stored_handle = bare.put(wire).await.expect("put descriptor");
    assert_eq!(stored_handle, handle);

    let downloader = client_over(bare).await;
    let mut sink = Vec::new();
    let err = downloader
        .download(&handle, &mut sink)
        .await
        .expect_err("blocks are gone");
    assert!(matches!(err, Error::BlockUnavailable { .. }));
    assert!(sink.is_empty(), "no partial bytes on failure");
}

#[tokio::test]
async fn transient_faults_are_retried_to_success() {
    let backing = MemoryBlobStore::new();
    let uploader = client_over(backing.clone()).await;
    let source = content(2, 2 * BLOCK_SIZE);
    let handle = uploader.upload(source.as_slice(), "flaky.bin").await.expect("upload");

    // Every cid fails twice before resolving; three retries absorb that.
    let flaky = Arc::new(FlakyStore::new(backing, 2));
    let downloader = Client::builder(Arc::clone(&flaky))
        .config(test_config())
        .build()
        .await
        .expect("client");

    let mut restored = Vec::new();
    downloader.download(&handle, &mut restored).await.expect("retries cover the faults");
    assert_eq!(restored, source);
    assert!(flaky.injected_failures() > 0, "the fault path was exercised");
}

#[tokio::test]
async fn persistent_faults_exhaust_the_retry_budget() {
    let backing = MemoryBlobStore::new();
    let uploader = client_over(backing.clone()).await;
    let source = content(3, BLOCK_SIZE);
    let handle = uploader.upload(source.as_slice(), "doomed.bin").await.expect("upload");

    // More failures per cid than the retry budget can absorb.
    let flaky = Arc::new(FlakyStore::new(backing, 10));
    let downloader = Client::builder(Arc::clone(&flaky))
        .config(test_config())
        .build()
        .await
        .expect("client");

    let mut sink = Vec::new();
    let err = downloader
        .download(&handle, &mut sink)
        .await
        .expect_err("budget exhausted");
    assert!(matches!(err, Error::Store(chaff_store::Error::Transient { .. })));
    assert!(sink.is_empty());
}

#[tokio::test]
async fn cancelled_upload_stops_before_reading() {
    let client = memory_client().await;
    let token = CancelToken::new();
    token.cancel();

    let source = content(4, BLOCK_SIZE);
    let err = client
        .upload_with_cancel(source.as_slice(), "never.bin", token)
        .await
        .expect_err("pre-cancelled");
    assert!(matches!(err, Error::Cancelled));
}

#[tokio::test]
async fn cancelled_download_writes_nothing() {
    let client = memory_client().await;
    let source = content(5, 2 * BLOCK_SIZE);
    let handle = client.upload(source.as_slice(), "halted.bin").await.expect("upload");

    let token = CancelToken::new();
    token.cancel();

    let mut sink = Vec::new();
    let err = client
        .download_with_cancel(&handle, &mut sink, token)
        .await
        .expect_err("pre-cancelled");
    assert!(matches!(err, Error::Cancelled));
    assert!(sink.is_empty(), "no bytes may reach the sink after cancellation");
}

#[tokio::test]
async fn missing_config_fails_the_builder() {
    let err = Client::builder(MemoryBlobStore::new())
        .build()
        .await
        .expect_err("config is required");
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn upload_errors_surface_reader_failures() {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use tokio::io::{AsyncRead, ReadBuf};

    /// Yields one block, then an I/O error.
    struct FailingReader {
        emitted: usize,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.emitted >= BLOCK_SIZE {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "reader broke",
                )));
            }
            let n = buf.remaining().min(BLOCK_SIZE - self.emitted);
            buf.put_slice(&vec![0xAAu8; n]);
            self.emitted += n;
            Poll::Ready(Ok(()))
        }
    }

    let client = memory_client().await;
    let err = client
        .upload(FailingReader { emitted: 0 }, "broken.bin")
        .await
        .expect_err("reader fails after one block");
    assert!(matches!(err, Error::Codec(chaff_block::Error::Io(_))));
}
