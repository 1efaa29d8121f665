//! Queue configuration.

use revq_core::env::env_usize;
use revq_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default number of candidates fetched per range read.
pub const DEFAULT_PAGE_SIZE: usize = 16;

/// Configuration for a [`Queue`](crate::Queue) handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Entries fetched per range read during dequeue.
    ///
    /// Larger pages amortize round trips under low contention; smaller pages
    /// waste fewer claim attempts when many consumers race for the head.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl QueueConfig {
    /// Returns a copy with the given page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `REVQ_PAGE_SIZE` (default: 16, must be at least 1)
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed, or if
    /// the resulting configuration is invalid.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(page_size) = env_usize("REVQ_PAGE_SIZE")? {
            config.page_size = page_size;
        }
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if `page_size` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::InvalidInput(
                "REVQ_PAGE_SIZE must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = QueueConfig::default();
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let config = QueueConfig::default().with_page_size(0);
        assert!(matches!(config.validate(), Err(Error::InvalidInput(_))));
    }
}
