//! Blocking until an entry arrives.

use futures::StreamExt;
use revq_core::{Error, EventFilter, KvStore, Result, Revision, WatchEvent};
use tokio_util::sync::CancellationToken;

use crate::namespace::Namespace;

/// Returns the first event in `namespace` at or after `from` that passes
/// `filter`.
///
/// `from` must be derived from a revision the caller has fully observed
/// (typically one past a range read's header revision) so nothing committed
/// in between is missed. Suspends on the store's watch stream; there is no
/// polling. The subscription is dropped on return.
///
/// # Errors
///
/// - `Error::Cancelled` once `cancel` fires.
/// - `Error::StaleWatch` if the stream ends or falls behind; resubscribing
///   from its `resume_from` continues without a gap.
/// - `Error::Compacted` if `from` is older than the store's history.
/// - Any other store error, unchanged.
pub async fn wait_for_arrival<S: KvStore + ?Sized>(
    store: &S,
    namespace: &Namespace,
    from: Revision,
    filter: EventFilter,
    cancel: &CancellationToken,
) -> Result<WatchEvent> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let mut events = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(Error::Cancelled),
        events = store.watch_prefix(namespace.as_str(), from, filter) => events?,
    };
    tracing::debug!(%from, "waiting for arrival");

    let mut resume_from = from;
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(%resume_from, "wait cancelled");
                return Err(Error::Cancelled);
            }
            next = events.next() => next,
        };

        match next {
            Some(Ok(event)) => {
                resume_from = resume_from.max(event.revision.next());
                if filter.matches(event.kind) {
                    tracing::debug!(key = %event.kv.key, revision = %event.revision, "woken");
                    return Ok(event);
                }
            }
            Some(Err(e)) => return Err(e),
            None => return Err(Error::StaleWatch { resume_from }),
        }
    }
}
