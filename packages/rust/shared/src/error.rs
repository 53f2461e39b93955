//! Error types for Gazette.
//!
//! Library crates use [`GazetteError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Retrieval ports report their own faults as [`SourceError`]; the branch
//! runner folds those into a `RetrievalOutcome::Failure` and they never
//! surface as a [`GazetteError`].

use std::path::PathBuf;

/// Top-level error type for all Gazette operations.
#[derive(Debug, thiserror::Error)]
pub enum GazetteError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while talking to a retrieval source.
    #[error("network error: {0}")]
    Network(String),

    /// Data validation error (bad document type, malformed input, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A render adapter could not produce a payload for one format.
    #[error("render error ({format}): {message}")]
    Render { format: String, message: String },

    /// An artifact could not be written under its final name.
    #[error("persist error at {path:?}: {message}")]
    Persist { path: PathBuf, message: String },

    /// Every retrieval branch of a run failed; nothing to assemble.
    #[error("all {count} sources failed")]
    AllSourcesFailed { count: usize },

    /// The run was cancelled before the join settled.
    #[error("run cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, GazetteError>;

impl GazetteError {
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

    /// Create a render error for the given format.
    pub fn render(format: impl std::fmt::Display, msg: impl Into<String>) -> Self {
        Self::Render {
            format: format.to_string(),
            message: msg.into(),
        }
    }

    /// Create a persist error for the given destination.
    pub fn persist(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Persist {
            path: path.into(),
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

/// Fault reported by a retrieval port.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The source could not be reached or answered with a non-success status.
    #[error("transport error: {0}")]
    Transport(String),

    /// The source answered, but the payload could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
