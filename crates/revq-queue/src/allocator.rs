//! Revision-ordered key allocation for new entries.

use std::sync::Arc;

use bytes::Bytes;
use revq_core::{KeyValue, KvStore, Result};

use crate::namespace::Namespace;

/// Creates entries under keys derived from the store's commit revision.
///
/// The store assigns the revision and names the key in one atomic call, so
/// keys are unique across all producers and sort in commit order. A failed
/// write allocates nothing.
pub struct KeyAllocator<S: KvStore + ?Sized> {
    store: Arc<S>,
}

impl<S: KvStore + ?Sized> Clone for KeyAllocator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: KvStore + ?Sized> KeyAllocator<S> {
    /// Creates an allocator over `store`.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Writes `value` as a new entry in `namespace` and returns it.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the write did not commit.
    pub async fn allocate(&self, namespace: &Namespace, value: Bytes) -> Result<KeyValue> {
        let kv = self
            .store
            .create_sequential(namespace.as_str(), value)
            .await?;
        tracing::debug!(key = %kv.key, revision = %kv.mod_revision, "allocated entry");
        Ok(kv)
    }
}
