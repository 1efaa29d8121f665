//! Shared test utilities for revq tests.
//!
//! This crate provides:
//! - [`RecordingStore`]: A store wrapper with operation recording and fault
//!   injection
//! - Custom assertion helpers
//!
//! # Example
//!
//! ```rust,ignore
//! use revq_test_utils::{OpKind, RecordingStore};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let store = Arc::new(RecordingStore::in_memory());
//!     let queue = Queue::new(store.clone(), "jobs").unwrap();
//!     // ... run test ...
//!     assert_eq!(store.count(OpKind::Range), 1);
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod assertions;
pub mod store;

pub use assertions::*;
pub use store::*;

/// Initialize test logging (call once per test module).
///
/// Output goes through the test harness's captured writer; `RUST_LOG`
/// overrides the default of debug-level protocol logs.
pub fn init_test_logging() {
    revq_core::init_logging_with(
        revq_core::LogFormat::Test,
        "revq_queue=debug,revq_core=debug",
    );
}
