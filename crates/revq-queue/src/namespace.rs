//! Queue namespaces.

use std::fmt;

use revq_core::{Error, Result};

/// Key prefix identifying one queue instance.
///
/// The prefix always ends in `/`, so `jobs` and `jobs2` never overlap.
/// Callers must still not nest one queue under another (`a` and `a/b`):
/// a range read over `a/` would see the nested queue's entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    /// Creates a namespace, appending a trailing `/` if missing.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if `name` is empty or whitespace.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let mut prefix = name.into();
        if prefix.trim().is_empty() {
            return Err(Error::InvalidInput(
                "queue namespace must not be empty".to_string(),
            ));
        }
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        Ok(Self(prefix))
    }

    /// Returns the key prefix.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Namespace {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
