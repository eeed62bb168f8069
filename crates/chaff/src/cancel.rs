// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! Cooperative cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{Error, Result};

/// A clonable cooperative cancellation token.
///
/// Pipelines check the token between blocks: cancelling stops new work
/// promptly, lets in-flight blob store calls finish (their results are
/// dropped), and guarantees that no bytes are written to a sink after the
/// cancellation is observed. Clones share the same state.
///
/// # Examples
///
/// ```
/// use chaff::CancelToken;
///
/// let token = CancelToken::new();
/// let observer = token.clone();
///
/// assert!(!observer.is_cancelled());
/// token.cancel();
/// assert!(observer.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Errors with [`Error::Cancelled`] once cancellation has been
    /// requested.
    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}
