//! Custom assertion helpers for queue tests.

use revq_core::{KeyValue, KvStore};

use crate::store::{OpKind, RecordingStore};

/// Asserts that `kvs` have distinct keys in ascending order.
///
/// # Panics
///
/// Panics if any key repeats or sorts before its predecessor.
pub fn assert_unique_sorted_keys(kvs: &[KeyValue]) {
    for pair in kvs.windows(2) {
        assert!(
            pair[0].key < pair[1].key,
            "Expected ascending unique keys, but {:?} precedes {:?}",
            pair[0].key,
            pair[1].key
        );
    }
}

/// Asserts that no entries remain under `prefix`.
///
/// # Panics
///
/// Panics if the store cannot be read or still holds an entry.
pub async fn assert_namespace_empty<S: KvStore + ?Sized>(store: &S, prefix: &str) {
    let page = store.range(prefix, 1).await.expect("range");
    assert!(
        page.kvs.is_empty(),
        "Expected {prefix} to be empty, but found {:?}",
        page.kvs[0].key
    );
}

/// Asserts that a blocked consumer did not poll: exactly `ranges` range reads
/// and `watches` watch subscriptions were issued.
///
/// # Panics
///
/// Panics if either count differs.
pub fn assert_no_polling<S: KvStore + ?Sized>(
    store: &RecordingStore<S>,
    ranges: usize,
    watches: usize,
) {
    assert_eq!(
        store.count(OpKind::Range),
        ranges,
        "Expected {ranges} range reads, operations: {:?}",
        store.operations()
    );
    assert_eq!(
        store.count(OpKind::Watch),
        watches,
        "Expected {watches} watch subscriptions, operations: {:?}",
        store.operations()
    );
}
