//! Ordering and payload behavior of a single queue.

use std::sync::Arc;

use bytes::Bytes;
use revq_core::MemoryStore;
use revq_queue::{Queue, QueueConfig};
use revq_test_utils::{assert_namespace_empty, init_test_logging};

#[tokio::test]
async fn serial_consumer_sees_insertion_order() {
    init_test_logging();
    let store = Arc::new(MemoryStore::new());
    let queue = Queue::new(store.clone(), "jobs").unwrap();

    for i in 0..50 {
        queue.enqueue(format!("item-{i}")).await.unwrap();
    }
    for i in 0..50 {
        let value = queue.dequeue().await.unwrap();
        assert_eq!(value, Bytes::from(format!("item-{i}")));
    }
    assert_namespace_empty(store.as_ref(), "jobs/").await;
}

#[tokio::test]
async fn two_handles_share_one_queue() {
    let store = Arc::new(MemoryStore::new());
    let producer = Queue::new(store.clone(), "q").unwrap();
    let consumer = Queue::new(store.clone(), "q").unwrap();

    for value in ["a", "b", "c"] {
        producer.enqueue(value).await.unwrap();
    }

    assert_eq!(consumer.dequeue().await.unwrap(), "a");
    assert_eq!(consumer.dequeue().await.unwrap(), "b");
    assert_eq!(consumer.dequeue().await.unwrap(), "c");
    assert_eq!(consumer.try_dequeue().await.unwrap(), None);
}

#[tokio::test]
async fn payload_bytes_are_preserved() {
    let store = Arc::new(MemoryStore::new());
    let queue = Queue::new(store, "bin").unwrap();

    let payloads = [
        Bytes::new(),
        Bytes::from_static(&[0x00, 0xff, 0x00, 0x7f]),
        Bytes::from(vec![0xab; 64 * 1024]),
    ];
    for payload in &payloads {
        queue.enqueue(payload.clone()).await.unwrap();
    }
    for payload in &payloads {
        assert_eq!(&queue.dequeue().await.unwrap(), payload);
    }
}

#[tokio::test]
async fn try_dequeue_on_empty_queue_returns_none() {
    let store = Arc::new(MemoryStore::new());
    let queue = Queue::new(store, "empty").unwrap();

    assert_eq!(queue.try_dequeue().await.unwrap(), None);
}

#[tokio::test]
async fn page_size_one_keeps_order() {
    let store = Arc::new(MemoryStore::new());
    let config = QueueConfig::default().with_page_size(1);
    let queue = Queue::with_config(store, "small", config).unwrap();

    for i in 0..5 {
        queue.enqueue(format!("{i}")).await.unwrap();
    }
    for i in 0..5 {
        assert_eq!(queue.try_dequeue().await.unwrap(), Some(Bytes::from(format!("{i}"))));
    }
}

#[tokio::test]
async fn namespaces_are_isolated() {
    let store = Arc::new(MemoryStore::new());
    let jobs = Queue::new(store.clone(), "jobs").unwrap();
    let jobs2 = Queue::new(store.clone(), "jobs2").unwrap();

    jobs2.enqueue("other").await.unwrap();
    jobs.enqueue("mine").await.unwrap();

    assert_eq!(jobs.dequeue().await.unwrap(), "mine");
    assert_eq!(jobs.try_dequeue().await.unwrap(), None);
    assert_eq!(jobs2.dequeue().await.unwrap(), "other");
}

#[tokio::test]
async fn keys_follow_revision_order() {
    let store = Arc::new(MemoryStore::new());
    let queue = Queue::new(store, "rev").unwrap();

    let first = queue.enqueue("a").await.unwrap();
    let second = queue.enqueue("b").await.unwrap();

    assert!(first.mod_revision < second.mod_revision);
    assert!(first.key < second.key);
    assert_eq!(first.key, format!("rev/{:020}", first.mod_revision.get()));
}
