//! Error types for LotScout.
//!
//! Library crates use [`LotScoutError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all LotScout operations.
#[derive(Debug, thiserror::Error)]
pub enum LotScoutError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Browser launch or session management error.
    #[error("browser error: {0}")]
    Browser(String),

    /// Page navigation, readiness wait, or script evaluation error.
    #[error("evaluate error: {0}")]
    Evaluate(String),

    /// Extracted data could not be parsed into domain records.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Notification delivery error.
    #[error("notify error: {0}")]
    Notify(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The run was cancelled via the root cancellation token.
    #[error("operation cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LotScoutError>;

impl LotScoutError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = LotScoutError::config("missing chat id");
        assert_eq!(err.to_string(), "config error: missing chat id");

        let err = LotScoutError::parse("model year not numeric");
        assert!(err.to_string().contains("model year not numeric"));

        let err = LotScoutError::Cancelled;
        assert_eq!(err.to_string(), "operation cancelled");
    }
}
