//! Environment variable helpers shared by configuration loaders.
//!
//! Values are trimmed; empty or whitespace-only values are treated as unset.

use crate::error::{Error, Result};

/// Reads a trimmed, non-empty environment variable.
#[must_use]
pub fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Reads an environment variable as a `usize`.
///
/// # Errors
///
/// Returns `Error::InvalidInput` if the variable is set but not a `usize`.
pub fn env_usize(name: &str) -> Result<Option<usize>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    parse_usize(name, &v).map(Some)
}

pub(crate) fn parse_usize(name: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|e| Error::InvalidInput(format!("{name} must be a usize: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_usize() {
        assert_eq!(parse_usize("X", " 42 ").expect("parse"), 42);

        let err = parse_usize("REVQ_PAGE_SIZE", "many").expect_err("must fail");
        assert!(err.to_string().contains("REVQ_PAGE_SIZE"));
    }

    #[test]
    fn test_unset_variable_is_none() {
        assert_eq!(env_string("REVQ_TEST_SURELY_UNSET_VARIABLE"), None);
        assert!(
            env_usize("REVQ_TEST_SURELY_UNSET_VARIABLE")
                .expect("unset is ok")
                .is_none()
        );
    }
}
