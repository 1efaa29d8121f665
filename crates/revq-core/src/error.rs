//! Error types and result aliases for revq.
//!
//! Losing a claim race is deliberately absent from this taxonomy: a failed
//! compare-and-delete is reported as `Ok(false)` by the store and never
//! surfaces as an [`Error`].

use crate::revision::Revision;

/// The result type used throughout revq.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in revq operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The backing store could not be reached or failed the request.
    #[error("store unavailable: {message}")]
    StoreUnavailable {
        /// Description of the failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A watch stream ended or fell behind before delivering a matching event.
    ///
    /// Resubscribing from `resume_from` observes every event the interrupted
    /// stream had not yet confirmed.
    #[error("watch interrupted; resume from revision {resume_from}")]
    StaleWatch {
        /// First revision the interrupted stream had not observed.
        resume_from: Revision,
    },

    /// A watch was requested from a revision the store no longer retains.
    #[error("revision {requested} has been compacted (compacted through {compacted})")]
    Compacted {
        /// The revision the caller asked to start from.
        requested: Revision,
        /// The newest revision dropped from history.
        compacted: Revision,
    },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a store-unavailable error with the given message.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a store-unavailable error with a source cause.
    #[must_use]
    pub fn unavailable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
