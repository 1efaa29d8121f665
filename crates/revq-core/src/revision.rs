//! Store revisions and revision-ordered key formatting.

use std::fmt;

/// Width of a zero-padded revision suffix. `u64::MAX` has 20 decimal digits.
pub const SEQUENCE_WIDTH: usize = 20;

/// A store-wide, strictly increasing version number.
///
/// Every committed write is assigned the next revision. Revisions double as
/// the optimistic-concurrency token for conditional writes and deletes, and
/// as the resume point for watch streams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(u64);

impl Revision {
    /// The revision before any write has been committed.
    pub const ZERO: Self = Self(0);

    /// Creates a revision from its raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw revision number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the revision immediately after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Revision {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Formats `prefix` followed by the zero-padded revision.
///
/// Lexical order of the produced keys matches numeric revision order.
///
/// # Example
///
/// ```rust
/// use revq_core::revision::{Revision, sequential_key};
///
/// assert_eq!(sequential_key("jobs/", Revision::new(42)), "jobs/00000000000000000042");
/// ```
#[must_use]
pub fn sequential_key(prefix: &str, revision: Revision) -> String {
    format!("{prefix}{:0width$}", revision.0, width = SEQUENCE_WIDTH)
}
