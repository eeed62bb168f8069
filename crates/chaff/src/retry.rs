// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! Deadline and retry plumbing for blob store calls.

use std::time::Duration;

use bytes::Bytes;
use recoverable::{Recovery, RecoveryKind};
use tracing::debug;

use chaff_store::{BlobStore, Cid};

/// `get` with a per-call deadline and exponential backoff on transient
/// failures.
///
/// The recovery classification of the error decides retryability; attempts
/// are capped at `1 + retry_attempts`. Backoff doubles from `base` with up
/// to half of `base` in jitter so synchronized workers fan out.
pub(crate) async fn get_with_retry<S: BlobStore>(
    store: &S,
    cid: &Cid,
    deadline: Duration,
    retry_attempts: u32,
    base: Duration,
) -> chaff_store::Result<Bytes> {
    let mut attempt = 0u32;
    loop {
        let error = match tokio::time::timeout(deadline, store.get(cid)).await {
            Ok(Ok(bytes)) => return Ok(bytes),
            Ok(Err(error)) => error,
            Err(_) => chaff_store::Error::Timeout { elapsed: deadline },
        };

        if attempt >= retry_attempts || error.recovery().kind() != RecoveryKind::Retry {
            return Err(error);
        }
        attempt += 1;

        let exponential = base.saturating_mul(1u32 << (attempt - 1).min(16));
        let jitter = Duration::from_millis(fastrand::u64(..=base.as_millis().max(1) as u64 / 2));
        let backoff = exponential + jitter;
        debug!(%cid, attempt, ?backoff, %error, "retrying blob fetch");
        tokio::time::sleep(backoff).await;
    }
}

/// `put` with a per-call deadline and no retry: the upload pipeline has no
/// safe partial state to resume from, so a deadline there is fatal.
pub(crate) async fn put_with_deadline<S: BlobStore>(
    store: &S,
    bytes: Bytes,
    deadline: Duration,
) -> chaff_store::Result<Cid> {
    match tokio::time::timeout(deadline, store.put(bytes)).await {
        Ok(result) => result,
        Err(_) => Err(chaff_store::Error::Timeout { elapsed: deadline }),
    }
}

/// Best-effort `has` with a deadline; probe failures read as "unknown",
/// which callers treat as absent.
pub(crate) async fn has_with_deadline<S: BlobStore>(
    store: &S,
    cid: &Cid,
    deadline: Duration,
) -> bool {
    matches!(
        tokio::time::timeout(deadline, store.has(cid)).await,
        Ok(Ok(true))
    )
}

#[cfg(test)]
mod tests {
    use chaff_store::testing::FlakyStore;
    use chaff_store::{Error, MemoryBlobStore};

    use super::*;

    const DEADLINE: Duration = Duration::from_secs(5);
    const BASE: Duration = Duration::from_millis(1);

    #[tokio::test]
    async fn survives_transient_failures_within_budget() {
        let inner = MemoryBlobStore::new();
        let cid = inner.put(Bytes::from_static(b"x")).await.expect("put");
        let flaky = FlakyStore::new(inner, 2);

        let bytes = get_with_retry(&flaky, &cid, DEADLINE, 3, BASE)
            .await
            .expect("two failures, three retries");
        assert_eq!(bytes, Bytes::from_static(b"x"));
        assert_eq!(flaky.injected_failures(), 2);
    }

    #[tokio::test]
    async fn gives_up_after_the_retry_budget() {
        let inner = MemoryBlobStore::new();
        let cid = inner.put(Bytes::from_static(b"x")).await.expect("put");
        let flaky = FlakyStore::new(inner, 10);

        let err = get_with_retry(&flaky, &cid, DEADLINE, 3, BASE)
            .await
            .expect_err("failures exceed retries");
        assert!(matches!(err, Error::Transient { .. }));
        assert_eq!(flaky.injected_failures(), 4, "one attempt plus three retries");
    }

    #[tokio::test]
    async fn does_not_retry_missing_blobs() {
        let store = MemoryBlobStore::new();
        let err = get_with_retry(&store, &Cid::from("absent"), DEADLINE, 3, BASE)
            .await
            .expect_err("missing");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn deadline_expiry_is_a_timeout() {
        use chaff_store::testing::SlowStore;

        let inner = MemoryBlobStore::new();
        let cid = inner.put(Bytes::from_static(b"x")).await.expect("put");
        let slow = SlowStore::new(inner, Duration::from_secs(60));

        let err = get_with_retry(&slow, &cid, Duration::from_millis(10), 0, BASE)
            .await
            .expect_err("store slower than deadline");
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn put_deadline_is_fatal_without_retry() {
        use chaff_store::testing::SlowStore;

        let slow = SlowStore::new(MemoryBlobStore::new(), Duration::from_secs(60));
        let err = put_with_deadline(&slow, Bytes::from_static(b"x"), Duration::from_millis(10))
            .await
            .expect_err("deadline");
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn has_probe_failures_read_as_absent() {
        let store = MemoryBlobStore::new();
        assert!(!has_with_deadline(&store, &Cid::from("absent"), DEADLINE).await);

        let cid = store.put(Bytes::from_static(b"x")).await.expect("put");
        assert!(has_with_deadline(&store, &cid, DEADLINE).await);
    }
}
