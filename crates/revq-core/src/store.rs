//! Store collaborator contract for the queue protocol.
//!
//! The queue never talks to a storage engine directly; it is written against
//! [`KvStore`], which captures what a linearizable, revisioned key-value store
//! must offer:
//! - A store-wide revision counter that increases on every committed write
//! - Sequential creates that report the revision they were assigned
//! - Prefix range reads in ascending key order with a `more` flag
//! - Compare-and-delete conditioned on a key's last-modified revision
//! - Resumable prefix watches starting at any retained revision
//!
//! Conditional failures (a put whose precondition no longer holds, a delete
//! whose expected revision is stale) are normal results, never errors.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::revision::Revision;

/// A key and its value as observed at some revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// Full key, including the prefix it was written under.
    pub key: String,
    /// Opaque payload.
    pub value: Bytes,
    /// Revision at which the key was created.
    pub create_revision: Revision,
    /// Revision of the last write to the key; the CAS token.
    pub mod_revision: Revision,
}

/// One page of a prefix range read.
#[derive(Debug, Clone, Default)]
pub struct RangePage {
    /// Entries in ascending key order.
    pub kvs: Vec<KeyValue>,
    /// Store revision the read observed.
    pub header_revision: Revision,
    /// Whether entries beyond this page exist under the prefix.
    pub more: bool,
}

/// Kind of change carried by a [`WatchEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A key was created or overwritten.
    Put,
    /// A key was removed.
    Delete,
}

/// A change notification from a watch stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// What happened to the key.
    pub kind: EventKind,
    /// The key after the change. Deletes carry an empty value.
    pub kv: KeyValue,
    /// Revision at which the change committed.
    pub revision: Revision,
}

impl WatchEvent {
    /// Returns true if this event created the key (as opposed to updating it).
    #[must_use]
    pub fn is_create(&self) -> bool {
        self.kind == EventKind::Put && self.kv.create_revision == self.kv.mod_revision
    }
}

/// Event kinds a watch should deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFilter {
    puts: bool,
    deletes: bool,
}

impl EventFilter {
    /// Delivers every event.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            puts: true,
            deletes: true,
        }
    }

    /// Delivers creates and updates only.
    #[must_use]
    pub const fn puts() -> Self {
        Self {
            puts: true,
            deletes: false,
        }
    }

    /// Delivers deletes only.
    #[must_use]
    pub const fn deletes() -> Self {
        Self {
            puts: false,
            deletes: true,
        }
    }

    /// Returns whether events of `kind` pass this filter.
    #[must_use]
    pub const fn matches(self, kind: EventKind) -> bool {
        match kind {
            EventKind::Put => self.puts,
            EventKind::Delete => self.deletes,
        }
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// Precondition for conditional puts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePrecondition {
    /// Write only if the key does not exist.
    DoesNotExist,
    /// Write only if the key's `mod_revision` equals the given revision.
    MatchesRevision(Revision),
    /// Write unconditionally.
    None,
}

/// Result of a conditional put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResult {
    /// Write committed at the returned revision.
    Success {
        /// Revision assigned to the write.
        revision: Revision,
    },
    /// Precondition failed; nothing was written.
    PreconditionFailed {
        /// The key's current `mod_revision` (`Revision::ZERO` if absent).
        current: Revision,
    },
}

/// Ordered stream of watch events. Dropping it cancels the subscription.
pub type WatchStream = BoxStream<'static, Result<WatchEvent>>;

/// Linearizable, revisioned key-value store with change notification.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Writes `value` under `key` subject to `precondition`.
    ///
    /// Returns `WriteResult::PreconditionFailed` if the precondition does not
    /// hold. That is a normal result, not an error.
    async fn put(
        &self,
        key: &str,
        value: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult>;

    /// Creates a new key under `prefix` named after the revision the write
    /// commits at, and returns it.
    ///
    /// Key assignment and the write are one atomic step: no key exists unless
    /// the write committed, and two calls never receive the same key.
    async fn create_sequential(&self, prefix: &str, value: Bytes) -> Result<KeyValue>;

    /// Reads up to `limit` entries under `prefix` in ascending key order.
    ///
    /// Returns `Error::InvalidInput` if `limit` is zero.
    async fn range(&self, prefix: &str, limit: usize) -> Result<RangePage>;

    /// Deletes `key` only if its `mod_revision` equals `expected`.
    ///
    /// Returns `Ok(false)` if the key is gone or was modified since.
    async fn delete_if_revision(&self, key: &str, expected: Revision) -> Result<bool>;

    /// Streams events under `prefix` with `revision >= from_revision`.
    ///
    /// Returns `Error::Compacted` if `from_revision` is older than the retained
    /// history. The stream yields `Error::StaleWatch` and ends if it cannot
    /// keep up with the live feed.
    async fn watch_prefix(
        &self,
        prefix: &str,
        from_revision: Revision,
        filter: EventFilter,
    ) -> Result<WatchStream>;

    /// Returns the store's latest committed revision.
    async fn current_revision(&self) -> Result<Revision>;
}
