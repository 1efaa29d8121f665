//! The queue handle: enqueue and the dequeue state machine.
//!
//! # Ordering Contract
//!
//! Candidates are offered in insertion order; the first successful claimant
//! among current contenders wins, not necessarily the first consumer to
//! observe it. With a single consumer the queue is strictly FIFO.
//!
//! # Dequeue States
//!
//! ```text
//! ScanOldest --claimed--------------------------> value
//! ScanOldest --all lost, page full--------------> ScanOldest
//! ScanOldest --drained at R---------------------> Wait{R+1}
//! Wait{from} --put at revision E----------------> ClaimWoken(E)
//! Wait{from} --stream interrupted at N----------> Wait{N}
//! Wait{from} --start compacted------------------> ScanOldest
//! ClaimWoken(E) --claimed-----------------------> value
//! ClaimWoken(E) --lost--------------------------> Wait{E+1}
//! ```
//!
//! A compacted watch start sends the loop back to `ScanOldest`, which
//! observes everything still present.

use std::sync::Arc;

use bytes::Bytes;
use revq_core::{Error, EventFilter, KeyValue, KvStore, Result, Revision, WatchEvent, queue_span};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use ulid::Ulid;

use crate::allocator::KeyAllocator;
use crate::claim::Claimer;
use crate::config::QueueConfig;
use crate::namespace::Namespace;
use crate::wait::wait_for_arrival;

/// A multi-producer, multi-consumer FIFO queue over a [`KvStore`].
///
/// Handles share no state beyond the store; any number of them may operate
/// on the same namespace concurrently, in one process or many.
pub struct Queue<S: KvStore + ?Sized> {
    store: Arc<S>,
    namespace: Namespace,
    config: QueueConfig,
    consumer_id: String,
    allocator: KeyAllocator<S>,
    claimer: Claimer<S>,
}

// Manual Clone implementation to avoid requiring S: Clone
impl<S: KvStore + ?Sized> Clone for Queue<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            namespace: self.namespace.clone(),
            config: self.config,
            consumer_id: self.consumer_id.clone(),
            allocator: self.allocator.clone(),
            claimer: self.claimer.clone(),
        }
    }
}

/// Where the dequeue loop goes next.
#[derive(Debug)]
enum DequeueState {
    /// Read the oldest page and try to claim from it.
    ScanOldest,
    /// Block until a put at or after `from`.
    Wait { from: Revision },
    /// Try to claim the entry a wait woke up on.
    ClaimWoken(WatchEvent),
}

enum ScanOutcome {
    Claimed(KeyValue),
    /// Every fetched candidate was lost and more entries remain.
    Rescan,
    /// Nothing claimable existed at `header_revision`.
    Drained { header_revision: Revision },
}

impl<S: KvStore + ?Sized> Queue<S> {
    /// Creates a queue handle with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if `namespace` is empty.
    pub fn new(store: Arc<S>, namespace: impl Into<String>) -> Result<Self> {
        Self::with_config(store, namespace, QueueConfig::default())
    }

    /// Creates a queue handle with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if `namespace` is empty or `config` is
    /// invalid.
    pub fn with_config(
        store: Arc<S>,
        namespace: impl Into<String>,
        config: QueueConfig,
    ) -> Result<Self> {
        config.validate()?;
        let namespace = Namespace::new(namespace)?;
        Ok(Self {
            allocator: KeyAllocator::new(Arc::clone(&store)),
            claimer: Claimer::new(Arc::clone(&store)),
            store,
            namespace,
            config,
            consumer_id: Ulid::new().to_string(),
        })
    }

    /// Returns the queue's namespace.
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Returns the id this handle logs under.
    #[must_use]
    pub fn consumer_id(&self) -> &str {
        &self.consumer_id
    }

    /// Returns the handle's configuration.
    #[must_use]
    pub fn config(&self) -> QueueConfig {
        self.config
    }

    /// Appends `value` to the queue and returns the created entry.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the write did not commit; in that case
    /// nothing was enqueued.
    pub async fn enqueue(&self, value: impl Into<Bytes>) -> Result<KeyValue> {
        let span = queue_span("enqueue", self.namespace.as_str(), &self.consumer_id);
        self.allocator
            .allocate(&self.namespace, value.into())
            .instrument(span)
            .await
    }

    /// Removes and returns the oldest claimable value, blocking while the
    /// queue is empty.
    ///
    /// # Errors
    ///
    /// Returns the store's error if it cannot be reached. Contention and
    /// interrupted watches are retried internally.
    pub async fn dequeue(&self) -> Result<Bytes> {
        self.dequeue_with_cancel(&CancellationToken::new()).await
    }

    /// Like [`dequeue`](Self::dequeue), but returns `Error::Cancelled` once
    /// `cancel` fires.
    ///
    /// Cancellation never strands an entry: a claim is either not started,
    /// or completes and its value is returned.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` on cancellation, or the store's error if it
    /// cannot be reached.
    pub async fn dequeue_with_cancel(&self, cancel: &CancellationToken) -> Result<Bytes> {
        let span = queue_span("dequeue", self.namespace.as_str(), &self.consumer_id);
        self.run_dequeue(cancel).instrument(span).await
    }

    /// Removes and returns the oldest claimable value without waiting.
    ///
    /// Returns `Ok(None)` if nothing could be claimed at the time of the scan.
    ///
    /// # Errors
    ///
    /// Returns the store's error if it cannot be reached.
    pub async fn try_dequeue(&self) -> Result<Option<Bytes>> {
        let span = queue_span("try_dequeue", self.namespace.as_str(), &self.consumer_id);
        self.scan_until_drained().instrument(span).await
    }

    async fn scan_until_drained(&self) -> Result<Option<Bytes>> {
        let never = CancellationToken::new();
        loop {
            match self.scan_oldest(&never).await? {
                ScanOutcome::Claimed(kv) => return Ok(Some(kv.value)),
                ScanOutcome::Rescan => {}
                ScanOutcome::Drained { .. } => return Ok(None),
            }
        }
    }

    async fn run_dequeue(&self, cancel: &CancellationToken) -> Result<Bytes> {
        let mut state = DequeueState::ScanOldest;
        loop {
            if cancel.is_cancelled() {
                tracing::debug!(?state, "dequeue cancelled");
                return Err(Error::Cancelled);
            }

            state = match state {
                DequeueState::ScanOldest => match self.scan_oldest(cancel).await? {
                    ScanOutcome::Claimed(kv) => {
                        tracing::debug!(key = %kv.key, "dequeued from scan");
                        return Ok(kv.value);
                    }
                    ScanOutcome::Rescan => DequeueState::ScanOldest,
                    ScanOutcome::Drained { header_revision } => DequeueState::Wait {
                        from: header_revision.next(),
                    },
                },

                DequeueState::Wait { from } => {
                    match wait_for_arrival(
                        self.store.as_ref(),
                        &self.namespace,
                        from,
                        EventFilter::puts(),
                        cancel,
                    )
                    .await
                    {
                        Ok(event) => DequeueState::ClaimWoken(event),
                        Err(Error::StaleWatch { resume_from }) => {
                            tracing::warn!(%from, %resume_from, "watch interrupted; resubscribing");
                            DequeueState::Wait { from: resume_from }
                        }
                        Err(Error::Compacted {
                            requested,
                            compacted,
                        }) => {
                            tracing::warn!(%requested, %compacted, "watch start compacted; rescanning");
                            DequeueState::ScanOldest
                        }
                        Err(e) => return Err(e),
                    }
                }

                DequeueState::ClaimWoken(event) => {
                    if self
                        .claimer
                        .claim(&event.kv.key, event.kv.mod_revision)
                        .await?
                    {
                        tracing::debug!(key = %event.kv.key, "dequeued from watch");
                        return Ok(event.kv.value);
                    }
                    DequeueState::Wait {
                        from: event.revision.next(),
                    }
                }
            };
        }
    }

    async fn scan_oldest(&self, cancel: &CancellationToken) -> Result<ScanOutcome> {
        let page = self
            .store
            .range(self.namespace.as_str(), self.config.page_size)
            .await?;
        tracing::debug!(
            entries = page.kvs.len(),
            more = page.more,
            header_revision = %page.header_revision,
            "scanned oldest entries"
        );

        if let Some(kv) = self.claimer.claim_first(&page.kvs, cancel).await? {
            return Ok(ScanOutcome::Claimed(kv));
        }
        if page.more {
            Ok(ScanOutcome::Rescan)
        } else {
            Ok(ScanOutcome::Drained {
                header_revision: page.header_revision,
            })
        }
    }
}
