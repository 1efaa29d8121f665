//! Store wrapper with operation recording and fault injection.
//!
//! Wraps any [`KvStore`] and records every call for test assertions. Faults
//! are armed per operation kind and can simulate an unreachable store, a
//! competing consumer winning a claim, or a watch stream being interrupted.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream};
use revq_core::{
    Error, EventFilter, KeyValue, KvStore, MemoryStore, RangePage, Result, Revision, WatchStream,
    WritePrecondition, WriteResult,
};

/// Record of a store call for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// Conditional put.
    Put {
        /// Key written.
        key: String,
        /// Precondition used.
        precondition: WritePrecondition,
    },
    /// Sequential create.
    CreateSequential {
        /// Prefix the key was created under.
        prefix: String,
    },
    /// Range read.
    Range {
        /// Prefix read.
        prefix: String,
        /// Requested page size.
        limit: usize,
    },
    /// Compare-and-delete.
    DeleteIfRevision {
        /// Key targeted.
        key: String,
        /// Revision the caller expected.
        expected: Revision,
        /// Whether this caller's delete applied.
        deleted: bool,
    },
    /// Watch subscription.
    Watch {
        /// Prefix watched.
        prefix: String,
        /// Starting revision.
        from: Revision,
    },
    /// Current revision lookup.
    CurrentRevision,
}

impl StoreOp {
    /// Returns the kind of this operation.
    pub fn kind(&self) -> OpKind {
        match self {
            Self::Put { .. } => OpKind::Put,
            Self::CreateSequential { .. } => OpKind::CreateSequential,
            Self::Range { .. } => OpKind::Range,
            Self::DeleteIfRevision { .. } => OpKind::DeleteIfRevision,
            Self::Watch { .. } => OpKind::Watch,
            Self::CurrentRevision => OpKind::CurrentRevision,
        }
    }
}

/// Operation kinds, used to count calls and arm failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// [`KvStore::put`].
    Put,
    /// [`KvStore::create_sequential`].
    CreateSequential,
    /// [`KvStore::range`].
    Range,
    /// [`KvStore::delete_if_revision`].
    DeleteIfRevision,
    /// [`KvStore::watch_prefix`].
    Watch,
    /// [`KvStore::current_revision`].
    CurrentRevision,
}

/// [`KvStore`] wrapper that records calls and injects faults.
pub struct RecordingStore<S: KvStore + ?Sized = MemoryStore> {
    inner: Arc<S>,
    operations: Arc<Mutex<Vec<StoreOp>>>,
    failures: Arc<Mutex<HashSet<OpKind>>>,
    steal_claims: Arc<AtomicUsize>,
    interrupt_watch_after: Arc<Mutex<Option<usize>>>,
    latency: Option<Duration>,
}

impl<S: KvStore + ?Sized> Clone for RecordingStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            operations: Arc::clone(&self.operations),
            failures: Arc::clone(&self.failures),
            steal_claims: Arc::clone(&self.steal_claims),
            interrupt_watch_after: Arc::clone(&self.interrupt_watch_after),
            latency: self.latency,
        }
    }
}

impl RecordingStore<MemoryStore> {
    /// Creates a recording store over a fresh [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }
}

impl<S: KvStore + ?Sized> RecordingStore<S> {
    /// Wraps `inner`.
    pub fn new(inner: Arc<S>) -> Self {
        Self {
            inner,
            operations: Arc::default(),
            failures: Arc::default(),
            steal_claims: Arc::default(),
            interrupt_watch_after: Arc::default(),
            latency: None,
        }
    }

    /// Returns a copy that sleeps for `latency` before every call.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    /// Returns all recorded operations.
    pub fn operations(&self) -> Vec<StoreOp> {
        self.operations.lock().expect("lock").clone()
    }

    /// Returns how many operations of `kind` were recorded.
    pub fn count(&self, kind: OpKind) -> usize {
        self.operations
            .lock()
            .expect("lock")
            .iter()
            .filter(|op| op.kind() == kind)
            .count()
    }

    /// Clears recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().expect("lock").clear();
    }

    /// Makes every `kind` call fail with `Error::StoreUnavailable`.
    pub fn inject_failure(&self, kind: OpKind) {
        self.failures.lock().expect("lock").insert(kind);
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        self.failures.lock().expect("lock").clear();
    }

    /// Lets a simulated competitor win the next `n` claims.
    ///
    /// The competitor's delete applies first, so the caller's
    /// `delete_if_revision` returns `false` and the entry is gone.
    pub fn steal_next_claims(&self, n: usize) {
        self.steal_claims.store(n, Ordering::SeqCst);
    }

    /// Interrupts the next watch after it delivers `n` events.
    ///
    /// The stream then yields `Error::StaleWatch` resuming after the last
    /// delivered event, and ends.
    pub fn interrupt_next_watch_after(&self, n: usize) {
        *self.interrupt_watch_after.lock().expect("lock") = Some(n);
    }

    fn record(&self, op: StoreOp) {
        self.operations.lock().expect("lock").push(op);
    }

    fn check_failure(&self, kind: OpKind) -> Result<()> {
        if self.failures.lock().expect("lock").contains(&kind) {
            return Err(Error::unavailable(format!("injected {kind:?} failure")));
        }
        Ok(())
    }

    async fn maybe_delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn take_steal(&self) -> bool {
        self.steal_claims
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

struct Interrupted {
    inner: WatchStream,
    remaining: usize,
    resume_from: Revision,
}

fn interrupt_after(inner: WatchStream, remaining: usize, from: Revision) -> WatchStream {
    let state = Interrupted {
        inner,
        remaining,
        resume_from: from,
    };
    stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        if state.remaining == 0 {
            let resume_from = state.resume_from;
            return Some((Err(Error::StaleWatch { resume_from }), None));
        }
        match state.inner.next().await? {
            Ok(event) => {
                state.remaining -= 1;
                state.resume_from = event.revision.next();
                Some((Ok(event), Some(state)))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
    .boxed()
}

#[async_trait]
impl<S: KvStore + ?Sized> KvStore for RecordingStore<S> {
    async fn put(
        &self,
        key: &str,
        value: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult> {
        self.maybe_delay().await;
        self.check_failure(OpKind::Put)?;
        self.record(StoreOp::Put {
            key: key.to_string(),
            precondition,
        });
        self.inner.put(key, value, precondition).await
    }

    async fn create_sequential(&self, prefix: &str, value: Bytes) -> Result<KeyValue> {
        self.maybe_delay().await;
        self.check_failure(OpKind::CreateSequential)?;
        self.record(StoreOp::CreateSequential {
            prefix: prefix.to_string(),
        });
        self.inner.create_sequential(prefix, value).await
    }

    async fn range(&self, prefix: &str, limit: usize) -> Result<RangePage> {
        self.maybe_delay().await;
        self.check_failure(OpKind::Range)?;
        self.record(StoreOp::Range {
            prefix: prefix.to_string(),
            limit,
        });
        self.inner.range(prefix, limit).await
    }

    async fn delete_if_revision(&self, key: &str, expected: Revision) -> Result<bool> {
        self.maybe_delay().await;
        self.check_failure(OpKind::DeleteIfRevision)?;

        let deleted = if self.take_steal() {
            self.inner.delete_if_revision(key, expected).await?;
            false
        } else {
            self.inner.delete_if_revision(key, expected).await?
        };
        self.record(StoreOp::DeleteIfRevision {
            key: key.to_string(),
            expected,
            deleted,
        });
        Ok(deleted)
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
        from_revision: Revision,
        filter: EventFilter,
    ) -> Result<WatchStream> {
        self.maybe_delay().await;
        self.check_failure(OpKind::Watch)?;
        self.record(StoreOp::Watch {
            prefix: prefix.to_string(),
            from: from_revision,
        });

        let events = self.inner.watch_prefix(prefix, from_revision, filter).await?;
        let interrupt = self.interrupt_watch_after.lock().expect("lock").take();
        Ok(match interrupt {
            Some(n) => interrupt_after(events, n, from_revision),
            None => events,
        })
    }

    async fn current_revision(&self) -> Result<Revision> {
        self.maybe_delay().await;
        self.check_failure(OpKind::CurrentRevision)?;
        self.record(StoreOp::CurrentRevision);
        self.inner.current_revision().await
    }
}
