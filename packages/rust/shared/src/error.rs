//! Error types for cohort-census.
//!
//! Library crates use [`CensusError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all census operations.
#[derive(Debug, thiserror::Error)]
pub enum CensusError {
    /// A non-empty line could not be split into one or two fields.
    #[error("format error on line {line}: {message} (got: {content:?})")]
    Format {
        /// 1-based line number within the parsed text.
        line: usize,
        /// The offending line, as read.
        content: String,
        message: String,
    },

    /// A strict merge saw a supplement name the base does not contain.
    #[error("schema error: supplement {source_index} contains '{name}', which is not in the base set")]
    Schema { name: String, source_index: usize },

    /// Lookup client construction or transport error.
    #[error("lookup error: {0}")]
    Lookup(String),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid input to an operation (empty name list, zero batch size, ...).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CensusError>;

impl CensusError {
    /// Create a format error for a specific input line.
    pub fn format(line: usize, content: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Format {
            line,
            content: content.into(),
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
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
        let err = CensusError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = CensusError::format(3, "a | b | c", "expected at most two fields");
        let msg = err.to_string();
        assert!(msg.contains("line 3"));
        assert!(msg.contains("a | b | c"));
    }

    #[test]
    fn schema_error_names_the_record() {
        let err = CensusError::Schema {
            name: "Carol".into(),
            source_index: 1,
        };
        assert!(err.to_string().contains("'Carol'"));
    }
}
