//! # revq-queue
//!
//! A distributed multi-producer, multi-consumer FIFO queue built on a
//! linearizable, revisioned key-value store.
//!
//! Producers write entries under keys derived from the store's commit
//! revision, so key order is commit order. Consumers read the oldest entries
//! and claim one by deleting it conditionally on the revision they observed;
//! exactly one contender's delete applies. When the queue is empty a consumer
//! blocks on a watch of the namespace instead of polling.
//!
//! Delivery is at-most-once: a claimed value is removed from the store
//! before it is returned, so a consumer that dies after claiming loses it.
//!
//! ## Modules
//!
//! - [`allocator`]: Revision-derived key allocation for enqueue
//! - [`claim`]: Compare-and-delete claims
//! - [`wait`]: Blocking on the namespace watch
//! - [`queue`]: The [`Queue`] handle and the dequeue state machine
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use revq_queue::prelude::*;
//!
//! let store = Arc::new(MemoryStore::new());
//! let queue = Queue::new(store, "jobs")?;
//!
//! queue.enqueue("first").await?;
//! queue.enqueue("second").await?;
//!
//! assert_eq!(queue.dequeue().await?, "first");
//!
//! let cancel = CancellationToken::new();
//! let value = queue.dequeue_with_cancel(&cancel).await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod allocator;
pub mod claim;
pub mod config;
pub mod namespace;
pub mod queue;
pub mod wait;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::QueueConfig;
    pub use crate::namespace::Namespace;
    pub use crate::queue::Queue;
    pub use revq_core::prelude::*;
    pub use tokio_util::sync::CancellationToken;
}

pub use allocator::KeyAllocator;
pub use claim::Claimer;
pub use config::{DEFAULT_PAGE_SIZE, QueueConfig};
pub use namespace::Namespace;
pub use queue::Queue;
pub use tokio_util::sync::CancellationToken;
pub use wait::wait_for_arrival;
