// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! End-to-end upload/download round trips.

mod common;

use pretty_assertions::assert_eq;

use chaff::{BLOCK_SIZE, Descriptor};
use chaff_block::xor3_bytes;
use chaff_store::BlobStore;

use common::{client_over, content, memory_client};

#[tokio::test]
async fn single_small_file_round_trips() {
    let client = memory_client().await;
    let source: Vec<u8> = (0u8..10).collect();

    let handle = client.upload(source.as_slice(), "ten.bin").await.expect("upload");

    let wire = client.store().get(&handle).await.expect("descriptor stored");
    let descriptor = Descriptor::decode(&wire).expect("decodes");
    assert_eq!(descriptor.block_count(), 1);
    assert_eq!(descriptor.file_size(), 10);
    assert_eq!(descriptor.filename(), "ten.bin");

    let mut restored = Vec::new();
    let written = client.download(&handle, &mut restored).await.expect("download");
    assert_eq!(written, 10);
    assert_eq!(restored, source);
}

#[tokio::test]
async fn exact_multi_block_file_round_trips() {
    let client = memory_client().await;
    let source: Vec<u8> = (0..3 * BLOCK_SIZE).map(|i| (i % 256) as u8).collect();

    let handle = client.upload(source.as_slice(), "exact.bin").await.expect("upload");

    let wire = client.store().get(&handle).await.expect("descriptor stored");
    let descriptor = Descriptor::decode(&wire).expect("decodes");
    assert_eq!(descriptor.block_count(), 3);

    let mut restored = Vec::new();
    client.download(&handle, &mut restored).await.expect("download");
    assert_eq!(restored, source);
}

#[tokio::test]
async fn round_trips_across_a_spread_of_sizes() {
    let client = memory_client().await;

    for (seed, len) in [
        (1u64, 1usize),
        (2, 333),
        (3, BLOCK_SIZE - 1),
        (4, BLOCK_SIZE),
        (5, BLOCK_SIZE + 1),
        (6, 2 * BLOCK_SIZE + 4097),
    ] {
        let source = content(seed, len);
        let handle = client
            .upload(source.as_slice(), &format!("size-{len}.bin"))
            .await
            .expect("upload");

        let mut restored = Vec::new();
        client.download(&handle, &mut restored).await.expect("download");
        assert_eq!(restored, source, "length {len} must round-trip");
    }
}

#[tokio::test]
async fn a_second_peer_can_reconstruct_from_the_store_alone() {
    let uploader = memory_client().await;
    let source = content(7, BLOCK_SIZE + 12345);

    let handle = uploader.upload(source.as_slice(), "shared.bin").await.expect("upload");

    // Same blob store, fresh client: empty cache, its own pool.
    let downloader = client_over(uploader.store().clone()).await;
    let mut restored = Vec::new();
    downloader.download(&handle, &mut restored).await.expect("download");
    assert_eq!(restored, source);
}

#[tokio::test]
async fn stored_triples_satisfy_the_xor_relation() {
    let client = memory_client().await;
    let source = content(8, BLOCK_SIZE + 100);

    let handle = client.upload(source.as_slice(), "xor.bin").await.expect("upload");
    let wire = client.store().get(&handle).await.expect("descriptor");
    let descriptor = Descriptor::decode(&wire).expect("decodes");

    for (index, triple) in descriptor.blocks().iter().enumerate() {
        assert_ne!(triple.rand1, triple.rand2, "randomizers must differ");

        let data = client.store().get(&triple.data).await.expect("data block");
        let r1 = client.store().get(&triple.rand1).await.expect("rand1");
        let r2 = client.store().get(&triple.rand2).await.expect("rand2");

        let plain = xor3_bytes(&data, &r1, &r2).expect("equal lengths");
        let offset = index * BLOCK_SIZE;
        let payload = descriptor.payload_len(index as u64) as usize;
        assert_eq!(&plain[..payload], &source[offset..offset + payload]);
        assert!(
            plain[payload..].iter().all(|&b| b == 0),
            "padding reconstructs to zeros"
        );
    }
}

#[tokio::test]
async fn anonymized_blocks_differ_from_their_sources() {
    let client = memory_client().await;
    let source = content(9, BLOCK_SIZE);

    let handle = client.upload(source.as_slice(), "opaque.bin").await.expect("upload");
    let wire = client.store().get(&handle).await.expect("descriptor");
    let descriptor = Descriptor::decode(&wire).expect("decodes");

    let stored = client
        .store()
        .get(&descriptor.blocks()[0].data)
        .await
        .expect("block");
    assert_ne!(
        stored.as_ref(),
        source.as_slice(),
        "plaintext must never be stored"
    );
}

#[tokio::test]
async fn empty_file_round_trips_to_nothing() {
    let client = memory_client().await;

    let handle = client.upload(&b""[..], "empty.bin").await.expect("upload");
    let wire = client.store().get(&handle).await.expect("descriptor");
    let descriptor = Descriptor::decode(&wire).expect("decodes");
    assert_eq!(descriptor.block_count(), 0);
    assert_eq!(descriptor.file_size(), 0);

    let mut restored = Vec::new();
    let written = client.download(&handle, &mut restored).await.expect("download");
    assert_eq!(written, 0);
    assert!(restored.is_empty());
}

#[tokio::test]
async fn metrics_track_uploads_and_cache_traffic() {
    let client = memory_client().await;
    let source = content(10, 2 * BLOCK_SIZE);

    let handle = client.upload(source.as_slice(), "metrics.bin").await.expect("upload");

    let snapshot = client.metrics_snapshot();
    assert_eq!(snapshot.bytes_uploaded_original, source.len() as u64);
    assert_eq!(snapshot.bytes_stored, 2 * BLOCK_SIZE as u64);
    assert_eq!(snapshot.blocks_reused, 4, "two reused randomizers per block");
    assert_eq!(snapshot.pool_size, 4);
    assert!(snapshot.personal_blocks >= 2, "uploaded blocks are cached");

    // The uploader's own download is served from its cache.
    let mut restored = Vec::new();
    client.download(&handle, &mut restored).await.expect("download");
    let snapshot = client.metrics_snapshot();
    assert!(snapshot.cache_hits >= 2, "data blocks hit the local cache");
}
