//! Error types for KaggleIngest.
//!
//! Library crates use [`IngestError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all KaggleIngest operations.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Invalid resource URL or out-of-range request parameters.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Data-source failure (network, HTTP status, unknown resource).
    #[error("source error: {0}")]
    Source(String),

    /// Notebook or CSV parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Output rendering error. Never cached; surfaced to the caller only.
    #[error("render error: {0}")]
    Render(String),

    /// Lookup of an unknown or purged job.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Rejected job state transition.
    #[error("job state error: {message}")]
    JobState { message: String },

    /// The job was cancelled before completing.
    #[error("job cancelled: {0}")]
    Cancelled(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, IngestError>;

impl IngestError {
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

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a job state error from any displayable message.
    pub fn job_state(msg: impl Into<String>) -> Self {
        Self::JobState {
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
