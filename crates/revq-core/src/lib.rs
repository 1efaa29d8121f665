//! # revq-core
//!
//! Core abstractions for the revq distributed queue.
//!
//! This crate provides the primitives the queue protocol is written against:
//!
//! - **Revisions**: The store-wide monotonic counter used for ordering and CAS
//! - **Store Contract**: [`KvStore`], the linearizable key-value collaborator
//! - **Memory Store**: [`MemoryStore`], an in-process reference implementation
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Logging initialization and span helpers
//!
//! ## Example
//!
//! ```rust,ignore
//! use revq_core::prelude::*;
//!
//! let store = MemoryStore::new();
//! let kv = store.create_sequential("jobs/", "payload".into()).await?;
//! assert_eq!(kv.key, "jobs/00000000000000000001");
//!
//! // Conditional delete succeeds once per revision
//! assert!(store.delete_if_revision(&kv.key, kv.mod_revision).await?);
//! assert!(!store.delete_if_revision(&kv.key, kv.mod_revision).await?);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod env;
pub mod error;
pub mod memory;
pub mod observability;
pub mod revision;
pub mod store;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use revq_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::memory::{MemoryStore, MemoryStoreConfig};
    pub use crate::revision::Revision;
    pub use crate::store::{
        EventFilter, EventKind, KeyValue, KvStore, RangePage, WatchEvent, WatchStream,
        WritePrecondition, WriteResult,
    };
}

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use memory::{MemoryStore, MemoryStoreConfig};
pub use observability::{LogFormat, init_logging, init_logging_with, queue_span};
pub use revision::Revision;
pub use store::{
    EventFilter, EventKind, KeyValue, KvStore, RangePage, WatchEvent, WatchStream,
    WritePrecondition, WriteResult,
};
