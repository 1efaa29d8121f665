//! Logging initialization and span helpers.
//!
//! Queue operations log protocol steps (scans, claim outcomes, waits) at
//! `debug` inside a span carrying the namespace and consumer id, so the
//! interleaving of concurrent consumers can be reconstructed from logs.

use std::str::FromStr;
use std::sync::Once;

use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::env::env_string;
use crate::error::{Error, Result};

static INIT: Once = Once::new();

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVES: &str = "info";

/// Where and how log lines are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Multi-line human-readable output.
    #[default]
    Pretty,
    /// Single-line human-readable output.
    Compact,
    /// Compact output routed through the test harness's captured writer.
    Test,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "test" => Ok(Self::Test),
            other => Err(Error::InvalidInput(format!(
                "unknown log format {other:?} (expected json, pretty, compact or test)"
            ))),
        }
    }
}

impl LogFormat {
    /// Reads `REVQ_LOG_FORMAT`, defaulting to [`LogFormat::Pretty`].
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for an unrecognized value.
    pub fn from_env() -> Result<Self> {
        env_string("REVQ_LOG_FORMAT").map_or(Ok(Self::default()), |v| v.parse())
    }
}

/// Installs the global subscriber with the [`DEFAULT_DIRECTIVES`] fallback.
///
/// See [`init_logging_with`].
pub fn init_logging(format: LogFormat) {
    init_logging_with(format, DEFAULT_DIRECTIVES);
}

/// Installs the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_directives` applies, and an
/// unparseable value falls back to [`DEFAULT_DIRECTIVES`]. Only the first
/// call in a process has any effect, and a subscriber installed by someone
/// else is left in place.
pub fn init_logging_with(format: LogFormat, default_directives: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_directives))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
        let registry = tracing_subscriber::registry().with(filter);

        let installed = match format {
            LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
            LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
            LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
            LogFormat::Test => registry
                .with(fmt::layer().compact().with_test_writer())
                .try_init(),
        };
        if installed.is_err() {
            tracing::debug!(?format, "global subscriber already set");
        }
    });
}

/// Creates a span for queue operations with standard fields.
///
/// ```rust
/// use revq_core::observability::queue_span;
///
/// let span = queue_span("dequeue", "jobs/", "01J9ZQ3V6Y7Q2W8N4K5M0R1T2X");
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn queue_span(operation: &str, namespace: &str, consumer: &str) -> Span {
    tracing::debug_span!(
        "queue",
        op = operation,
        namespace = namespace,
        consumer = consumer,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parses() {
        assert_eq!("JSON".parse::<LogFormat>().expect("json"), LogFormat::Json);
        assert_eq!(" compact ".parse::<LogFormat>().expect("compact"), LogFormat::Compact);
        assert_eq!("test".parse::<LogFormat>().expect("test"), LogFormat::Test);
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_repeated_init_is_harmless() {
        init_logging_with(LogFormat::Test, "revq_core=debug");
        init_logging(LogFormat::Json);

        let span = queue_span("enqueue", "jobs/", "consumer-1");
        let _guard = span.enter();
        tracing::debug!("message in queue span");
    }
}
