//! In-memory revisioned store with resumable prefix watches.
//!
//! Thread-safe via a single `Mutex`, which makes every operation trivially
//! linearizable. Suitable for tests and single-process deployments.
//!
//! # Watch Delivery
//!
//! Committed events are appended to a bounded history and then published on a
//! `broadcast` channel, both while the state lock is held. A new watch copies
//! the matching history and subscribes under the same lock, so the backlog and
//! the live feed meet without a gap. Events older than the retained history
//! are reported as [`Error::Compacted`]; a subscriber that falls more than
//! `watch_buffer` events behind the live feed receives [`Error::StaleWatch`].

use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::env::env_usize;
use crate::error::{Error, Result};
use crate::revision::{Revision, sequential_key};
use crate::store::{
    EventFilter, EventKind, KeyValue, KvStore, RangePage, WatchEvent, WatchStream,
    WritePrecondition, WriteResult,
};

/// Default number of events retained for watch resumption.
pub const DEFAULT_HISTORY_LIMIT: usize = 10_000;

/// Default per-subscriber live event buffer.
pub const DEFAULT_WATCH_BUFFER: usize = 1_024;

/// Configuration for [`MemoryStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStoreConfig {
    /// Number of events kept for watches that start in the past.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Live events a watcher may fall behind before its stream goes stale.
    #[serde(default = "default_watch_buffer")]
    pub watch_buffer: usize,
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

fn default_watch_buffer() -> usize {
    DEFAULT_WATCH_BUFFER
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            watch_buffer: DEFAULT_WATCH_BUFFER,
        }
    }
}

impl MemoryStoreConfig {
    /// Loads configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `REVQ_STORE_HISTORY_LIMIT` (default: 10000)
    /// - `REVQ_STORE_WATCH_BUFFER` (default: 1024, must be greater than 0)
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed, or if
    /// the resulting configuration is invalid.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(limit) = env_usize("REVQ_STORE_HISTORY_LIMIT")? {
            config.history_limit = limit;
        }
        if let Some(buffer) = env_usize("REVQ_STORE_WATCH_BUFFER")? {
            config.watch_buffer = buffer;
        }
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if `watch_buffer` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.watch_buffer == 0 {
            return Err(Error::InvalidInput(
                "REVQ_STORE_WATCH_BUFFER must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// In-memory [`KvStore`].
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
    events: broadcast::Sender<WatchEvent>,
    history_limit: usize,
}

#[derive(Debug, Default)]
struct State {
    revision: Revision,
    entries: BTreeMap<String, Stored>,
    /// Events with revision greater than `compacted`, oldest first.
    history: VecDeque<WatchEvent>,
    compacted: Revision,
}

#[derive(Debug)]
struct Stored {
    value: Bytes,
    create_revision: Revision,
    mod_revision: Revision,
}

impl Stored {
    fn to_key_value(&self, key: &str) -> KeyValue {
        KeyValue {
            key: key.to_string(),
            value: self.value.clone(),
            create_revision: self.create_revision,
            mod_revision: self.mod_revision,
        }
    }
}

impl State {
    fn advance(&mut self) -> Revision {
        self.revision = self.revision.next();
        self.revision
    }

    fn compact_through(&mut self, revision: Revision) {
        while self
            .history
            .front()
            .is_some_and(|event| event.revision <= revision)
        {
            self.history.pop_front();
        }
        self.compacted = self.compacted.max(revision);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(DEFAULT_WATCH_BUFFER);
        Self {
            state: Mutex::new(State::default()),
            events,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Creates an empty store with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the configuration is invalid.
    pub fn with_config(config: MemoryStoreConfig) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.watch_buffer);
        Ok(Self {
            state: Mutex::new(State::default()),
            events,
            history_limit: config.history_limit,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })
    }

    /// Records a committed event and publishes it to live watchers.
    ///
    /// Must be called with the state lock held.
    fn commit(&self, state: &mut State, event: WatchEvent) {
        state.history.push_back(event.clone());
        if state.history.len() > self.history_limit {
            let overflow = state.history.len() - self.history_limit;
            if let Some(last_dropped) = state.history.get(overflow - 1).map(|e| e.revision) {
                state.compact_through(last_dropped);
            }
        }
        // No receivers is fine; nobody is watching.
        let _ = self.events.send(event);
    }

    /// Returns the current value of `key`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn get(&self, key: &str) -> Result<Option<KeyValue>> {
        let state = self.lock()?;
        Ok(state.entries.get(key).map(|stored| stored.to_key_value(key)))
    }

    /// Returns the number of live keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.entries.len())
    }

    /// Returns true if no keys are stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.entries.is_empty())
    }

    /// Drops history through `revision`; later watches must start after it.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if `revision` is newer than the store.
    pub fn compact(&self, revision: Revision) -> Result<()> {
        let mut state = self.lock()?;
        if revision > state.revision {
            return Err(Error::InvalidInput(format!(
                "cannot compact to {revision}: current revision is {}",
                state.revision
            )));
        }
        state.compact_through(revision);
        tracing::debug!(%revision, retained = state.history.len(), "compacted history");
        Ok(())
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn put(
        &self,
        key: &str,
        value: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult> {
        if key.is_empty() {
            return Err(Error::InvalidInput("key must not be empty".into()));
        }

        let mut state = self.lock()?;
        let current = state
            .entries
            .get(key)
            .map(|stored| (stored.create_revision, stored.mod_revision));

        match (precondition, current) {
            (WritePrecondition::DoesNotExist, Some((_, modified))) => {
                return Ok(WriteResult::PreconditionFailed { current: modified });
            }
            (WritePrecondition::MatchesRevision(expected), Some((_, modified)))
                if modified != expected =>
            {
                return Ok(WriteResult::PreconditionFailed { current: modified });
            }
            (WritePrecondition::MatchesRevision(_), None) => {
                return Ok(WriteResult::PreconditionFailed {
                    current: Revision::ZERO,
                });
            }
            _ => {}
        }

        let revision = state.advance();
        let stored = Stored {
            value,
            create_revision: current.map_or(revision, |(created, _)| created),
            mod_revision: revision,
        };
        let kv = stored.to_key_value(key);
        state.entries.insert(key.to_string(), stored);
        self.commit(
            &mut state,
            WatchEvent {
                kind: EventKind::Put,
                kv,
                revision,
            },
        );

        Ok(WriteResult::Success { revision })
    }

    async fn create_sequential(&self, prefix: &str, value: Bytes) -> Result<KeyValue> {
        if prefix.is_empty() {
            return Err(Error::InvalidInput("prefix must not be empty".into()));
        }

        let mut state = self.lock()?;
        let revision = state.revision.next();
        let key = sequential_key(prefix, revision);
        if state.entries.contains_key(&key) {
            return Err(Error::Internal {
                message: format!("sequential key {key} already exists"),
            });
        }

        state.advance();
        let stored = Stored {
            value,
            create_revision: revision,
            mod_revision: revision,
        };
        let kv = stored.to_key_value(&key);
        state.entries.insert(key, stored);
        self.commit(
            &mut state,
            WatchEvent {
                kind: EventKind::Put,
                kv: kv.clone(),
                revision,
            },
        );

        Ok(kv)
    }

    async fn range(&self, prefix: &str, limit: usize) -> Result<RangePage> {
        if limit == 0 {
            return Err(Error::InvalidInput("range limit must be at least 1".into()));
        }

        let state = self.lock()?;
        let mut matching = state
            .entries
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix));

        let kvs: Vec<KeyValue> = matching
            .by_ref()
            .take(limit)
            .map(|(key, stored)| stored.to_key_value(key))
            .collect();
        let more = matching.next().is_some();

        Ok(RangePage {
            kvs,
            header_revision: state.revision,
            more,
        })
    }

    async fn delete_if_revision(&self, key: &str, expected: Revision) -> Result<bool> {
        let mut state = self.lock()?;
        let matches = state
            .entries
            .get(key)
            .is_some_and(|stored| stored.mod_revision == expected);
        if !matches {
            return Ok(false);
        }

        let revision = state.advance();
        let create_revision = state
            .entries
            .remove(key)
            .map_or(revision, |stored| stored.create_revision);
        self.commit(
            &mut state,
            WatchEvent {
                kind: EventKind::Delete,
                kv: KeyValue {
                    key: key.to_string(),
                    value: Bytes::new(),
                    create_revision,
                    mod_revision: revision,
                },
                revision,
            },
        );

        Ok(true)
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
        from_revision: Revision,
        filter: EventFilter,
    ) -> Result<WatchStream> {
        let state = self.lock()?;
        if state.compacted > Revision::ZERO && from_revision <= state.compacted {
            return Err(Error::Compacted {
                requested: from_revision,
                compacted: state.compacted,
            });
        }

        let backlog: VecDeque<WatchEvent> = state
            .history
            .iter()
            .filter(|event| event.revision >= from_revision && event.kv.key.starts_with(prefix))
            .cloned()
            .collect();
        let live = self.events.subscribe();
        drop(state);

        let cursor = WatchCursor {
            prefix: prefix.to_string(),
            filter,
            backlog,
            live,
            next: from_revision,
            done: false,
        };
        Ok(cursor.into_stream())
    }

    async fn current_revision(&self) -> Result<Revision> {
        Ok(self.lock()?.revision)
    }
}

/// Per-subscriber watch state: retained backlog first, then the live feed.
struct WatchCursor {
    prefix: String,
    filter: EventFilter,
    backlog: VecDeque<WatchEvent>,
    live: broadcast::Receiver<WatchEvent>,
    /// Lowest revision this stream has not yet observed.
    next: Revision,
    done: bool,
}

impl WatchCursor {
    fn into_stream(self) -> WatchStream {
        stream::unfold(self, |mut cursor| async move {
            if cursor.done {
                return None;
            }
            loop {
                let event = match cursor.backlog.pop_front() {
                    Some(event) => event,
                    None => match cursor.live.recv().await {
                        Ok(event) => event,
                        Err(RecvError::Lagged(skipped)) => {
                            cursor.done = true;
                            let resume_from = cursor.next;
                            tracing::warn!(
                                prefix = %cursor.prefix,
                                skipped,
                                %resume_from,
                                "watch fell behind live feed"
                            );
                            return Some((Err(Error::StaleWatch { resume_from }), cursor));
                        }
                        Err(RecvError::Closed) => {
                            cursor.done = true;
                            return Some((Err(Error::unavailable("watch feed closed")), cursor));
                        }
                    },
                };

                if event.revision < cursor.next {
                    continue;
                }
                cursor.next = event.revision.next();
                if event.kv.key.starts_with(&cursor.prefix) && cursor.filter.matches(event.kind) {
                    return Some((Ok(event), cursor));
                }
            }
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn next_event(stream: &mut WatchStream) -> WatchEvent {
        tokio::time::timeout(std::time::Duration::from_secs(5), stream.next())
            .await
            .expect("event before timeout")
            .expect("stream open")
            .expect("event ok")
    }

    #[tokio::test]
    async fn test_create_sequential_assigns_revision_keys() {
        let store = MemoryStore::new();

        let first = store
            .create_sequential("q/", Bytes::from("a"))
            .await
            .expect("create");
        let second = store
            .create_sequential("q/", Bytes::from("b"))
            .await
            .expect("create");

        assert_eq!(first.key, "q/00000000000000000001");
        assert_eq!(second.key, "q/00000000000000000002");
        assert_eq!(first.create_revision, first.mod_revision);
        assert!(first.key < second.key);
        assert_eq!(
            store.current_revision().await.expect("rev"),
            Revision::new(2)
        );
    }

    #[tokio::test]
    async fn test_range_pages_in_key_order() {
        let store = MemoryStore::new();
        for value in ["a", "b", "c"] {
            store
                .create_sequential("q/", Bytes::from(value))
                .await
                .expect("create");
        }
        store
            .create_sequential("other/", Bytes::from("x"))
            .await
            .expect("create");

        let page = store.range("q/", 2).await.expect("range");
        assert_eq!(page.kvs.len(), 2);
        assert_eq!(page.kvs[0].value, Bytes::from("a"));
        assert_eq!(page.kvs[1].value, Bytes::from("b"));
        assert!(page.more);
        assert_eq!(page.header_revision, Revision::new(4));

        let page = store.range("q/", 3).await.expect("range");
        assert_eq!(page.kvs.len(), 3);
        assert!(!page.more);
    }

    #[tokio::test]
    async fn test_range_rejects_zero_limit() {
        let store = MemoryStore::new();
        let result = store.range("q/", 0).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_delete_if_revision() {
        let store = MemoryStore::new();
        let kv = store
            .create_sequential("q/", Bytes::from("a"))
            .await
            .expect("create");

        // Stale revision loses
        let stale = store
            .delete_if_revision(&kv.key, Revision::new(99))
            .await
            .expect("delete");
        assert!(!stale);

        let deleted = store
            .delete_if_revision(&kv.key, kv.mod_revision)
            .await
            .expect("delete");
        assert!(deleted);

        // Second claimant on the same revision loses
        let again = store
            .delete_if_revision(&kv.key, kv.mod_revision)
            .await
            .expect("delete");
        assert!(!again);
        assert!(store.is_empty().expect("empty"));
    }

    #[tokio::test]
    async fn test_update_invalidates_claim_token() {
        let store = MemoryStore::new();
        let kv = store
            .create_sequential("q/", Bytes::from("a"))
            .await
            .expect("create");

        let result = store
            .put(
                &kv.key,
                Bytes::from("a2"),
                WritePrecondition::MatchesRevision(kv.mod_revision),
            )
            .await
            .expect("put");
        assert!(matches!(result, WriteResult::Success { .. }));

        let deleted = store
            .delete_if_revision(&kv.key, kv.mod_revision)
            .await
            .expect("delete");
        assert!(!deleted);

        let current = store.get(&kv.key).expect("get").expect("present");
        assert_eq!(current.create_revision, kv.create_revision);
        assert!(current.mod_revision > kv.mod_revision);
    }

    #[tokio::test]
    async fn test_put_preconditions() {
        let store = MemoryStore::new();

        let created = store
            .put("k", Bytes::from("v1"), WritePrecondition::DoesNotExist)
            .await
            .expect("put");
        let WriteResult::Success { revision } = created else {
            panic!("expected success");
        };

        let duplicate = store
            .put("k", Bytes::from("v2"), WritePrecondition::DoesNotExist)
            .await
            .expect("put");
        assert_eq!(
            duplicate,
            WriteResult::PreconditionFailed { current: revision }
        );

        let missing = store
            .put(
                "absent",
                Bytes::from("v"),
                WritePrecondition::MatchesRevision(revision),
            )
            .await
            .expect("put");
        assert_eq!(
            missing,
            WriteResult::PreconditionFailed {
                current: Revision::ZERO
            }
        );
    }

    #[tokio::test]
    async fn test_watch_replays_history_then_live() {
        let store = MemoryStore::new();
        let first = store
            .create_sequential("q/", Bytes::from("a"))
            .await
            .expect("create");

        let mut stream = store
            .watch_prefix("q/", first.mod_revision, EventFilter::all())
            .await
            .expect("watch");

        store
            .create_sequential("other/", Bytes::from("x"))
            .await
            .expect("create");
        let second = store
            .create_sequential("q/", Bytes::from("b"))
            .await
            .expect("create");
        store
            .delete_if_revision(&first.key, first.mod_revision)
            .await
            .expect("delete");

        let replayed = next_event(&mut stream).await;
        assert_eq!(replayed.kv.key, first.key);
        assert!(replayed.is_create());

        let live = next_event(&mut stream).await;
        assert_eq!(live.kv.key, second.key);
        assert_eq!(live.revision, second.mod_revision);

        let deleted = next_event(&mut stream).await;
        assert_eq!(deleted.kind, EventKind::Delete);
        assert_eq!(deleted.kv.key, first.key);
    }

    #[tokio::test]
    async fn test_watch_filters_event_kinds() {
        let store = MemoryStore::new();
        let kv = store
            .create_sequential("q/", Bytes::from("a"))
            .await
            .expect("create");
        store
            .delete_if_revision(&kv.key, kv.mod_revision)
            .await
            .expect("delete");

        let mut deletes = store
            .watch_prefix("q/", Revision::new(1), EventFilter::deletes())
            .await
            .expect("watch");
        let event = next_event(&mut deletes).await;
        assert_eq!(event.kind, EventKind::Delete);
        assert_eq!(event.revision, Revision::new(2));
    }

    #[tokio::test]
    async fn test_watch_from_compacted_revision_fails() {
        let store = MemoryStore::new();
        for value in ["a", "b", "c"] {
            store
                .create_sequential("q/", Bytes::from(value))
                .await
                .expect("create");
        }
        store.compact(Revision::new(2)).expect("compact");

        let result = store
            .watch_prefix("q/", Revision::new(2), EventFilter::all())
            .await;
        assert!(matches!(
            result,
            Err(Error::Compacted { compacted, .. }) if compacted == Revision::new(2)
        ));

        let mut stream = store
            .watch_prefix("q/", Revision::new(3), EventFilter::all())
            .await
            .expect("watch after compaction point");
        assert_eq!(next_event(&mut stream).await.revision, Revision::new(3));
    }

    #[tokio::test]
    async fn test_history_limit_compacts_oldest() {
        let store = MemoryStore::with_config(MemoryStoreConfig {
            history_limit: 2,
            ..MemoryStoreConfig::default()
        })
        .expect("config");
        for value in ["a", "b", "c", "d"] {
            store
                .create_sequential("q/", Bytes::from(value))
                .await
                .expect("create");
        }

        let result = store
            .watch_prefix("q/", Revision::new(2), EventFilter::all())
            .await;
        assert!(matches!(result, Err(Error::Compacted { .. })));
        assert!(
            store
                .watch_prefix("q/", Revision::new(3), EventFilter::all())
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_lagging_watch_goes_stale_and_resumes() {
        let store = MemoryStore::with_config(MemoryStoreConfig {
            watch_buffer: 2,
            ..MemoryStoreConfig::default()
        })
        .expect("config");

        let mut stream = store
            .watch_prefix("q/", Revision::new(1), EventFilter::all())
            .await
            .expect("watch");
        for value in ["a", "b", "c", "d", "e"] {
            store
                .create_sequential("q/", Bytes::from(value))
                .await
                .expect("create");
        }

        let stale = stream.next().await.expect("item");
        let Err(Error::StaleWatch { resume_from }) = stale else {
            panic!("expected stale watch, got {stale:?}");
        };
        assert_eq!(resume_from, Revision::new(1));
        assert!(stream.next().await.is_none(), "stale stream ends");

        let mut resumed = store
            .watch_prefix("q/", resume_from, EventFilter::all())
            .await
            .expect("resume");
        for expected in 1..=5 {
            assert_eq!(
                next_event(&mut resumed).await.revision,
                Revision::new(expected)
            );
        }
    }

    #[test]
    fn test_config_rejects_zero_buffer() {
        let config = MemoryStoreConfig {
            watch_buffer: 0,
            ..MemoryStoreConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(MemoryStore::with_config(config).is_err());
    }
}
