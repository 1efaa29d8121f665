//! Claiming entries with compare-and-delete.
//!
//! A claim deletes a key only if its `mod_revision` still equals the revision
//! the caller observed. Among any number of concurrent callers holding the
//! same observation, exactly one delete applies; the rest see `false`.
//! Losing is an expected outcome and is never reported as an error.

use std::sync::Arc;

use revq_core::{Error, KeyValue, KvStore, Result, Revision};
use tokio_util::sync::CancellationToken;

/// Transfers ownership of entries from the queue to a single consumer.
pub struct Claimer<S: KvStore + ?Sized> {
    store: Arc<S>,
}

impl<S: KvStore + ?Sized> Clone for Claimer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: KvStore + ?Sized> Claimer<S> {
    /// Creates a claimer over `store`.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Attempts to claim `key` as last observed at `expected`.
    ///
    /// Returns `Ok(true)` if this caller removed the entry, `Ok(false)` if it
    /// was already claimed or modified.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the delete could not be attempted.
    pub async fn claim(&self, key: &str, expected: Revision) -> Result<bool> {
        let claimed = self.store.delete_if_revision(key, expected).await?;
        tracing::debug!(key, %expected, claimed, "claim attempt");
        Ok(claimed)
    }

    /// Claims the first claimable entry of `candidates`, in order.
    ///
    /// Every candidate is attempted until one succeeds. Cancellation is
    /// checked before each attempt; an attempt already sent is not abandoned.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` if `cancel` fires between attempts, or the
    /// store's error if a delete could not be attempted.
    pub async fn claim_first(
        &self,
        candidates: &[KeyValue],
        cancel: &CancellationToken,
    ) -> Result<Option<KeyValue>> {
        for kv in candidates {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if self.claim(&kv.key, kv.mod_revision).await? {
                return Ok(Some(kv.clone()));
            }
        }
        Ok(None)
    }
}
