// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! Error types for blob store operations.

use std::time::Duration;

use recoverable::{Recovery, RecoveryInfo};
use thiserror::Error;

use crate::Cid;

/// Any error that may arise from a blob store operation.
///
/// Callers that retry should not match on variants directly; the type
/// implements [`recoverable::Recovery`], and the recovery classification is
/// the supported way to decide whether another attempt can help.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The store has no blob under the requested cid.
    ///
    /// This is a permanent condition for the attempted call; whether the blob
    /// appears later (e.g. through replication) is outside this contract.
    #[error("blob not found: {cid}")]
    NotFound {
        /// The cid that could not be resolved.
        cid: Cid,
    },

    /// A transport-level failure that may resolve on its own.
    #[error("transient blob store failure: {source}")]
    Transient {
        /// The underlying transport error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A failure that will not resolve by retrying.
    #[error("permanent blob store failure: {source}")]
    Permanent {
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The per-call deadline elapsed before the store responded.
    #[error("blob store call timed out after {elapsed:?}")]
    Timeout {
        /// How long the call was allowed to run.
        elapsed: Duration,
    },
}

impl Error {
    /// Creates a transient error from any underlying cause.
    pub fn transient(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Transient {
            source: cause.into(),
        }
    }

    /// Creates a permanent error from any underlying cause.
    pub fn permanent(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Permanent {
            source: cause.into(),
        }
    }

    /// Returns `true` if the error reports an absent blob.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl Recovery for Error {
    fn recovery(&self) -> RecoveryInfo {
        match self {
            Self::Transient { .. } | Self::Timeout { .. } => RecoveryInfo::retry(),
            Self::NotFound { .. } | Self::Permanent { .. } => RecoveryInfo::never(),
        }
    }
}

/// A specialized [`Result`] for blob store operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use recoverable::RecoveryKind;
    use static_assertions::assert_impl_all;

    use super::*;

    #[test]
    fn thread_safe_type() {
        assert_impl_all!(Error: Send, Sync);
    }

    #[test]
    fn transient_and_timeout_are_retryable() {
        let e = Error::transient("connection reset");
        assert_eq!(e.recovery().kind(), RecoveryKind::Retry);

        let e = Error::Timeout {
            elapsed: Duration::from_secs(30),
        };
        assert_eq!(e.recovery().kind(), RecoveryKind::Retry);
    }

    #[test]
    fn not_found_and_permanent_are_terminal() {
        let e = Error::NotFound {
            cid: Cid::from("missing"),
        };
        assert_eq!(e.recovery().kind(), RecoveryKind::Never);
        assert!(e.is_not_found());

        let e = Error::permanent("store decommissioned");
        assert_eq!(e.recovery().kind(), RecoveryKind::Never);
        assert!(!e.is_not_found());
    }
}
