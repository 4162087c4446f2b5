//! Error types for SiteAdvisor.
//!
//! Library crates use [`SiteAdvisorError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! No variant is fatal to a pipeline run: every component converts its own
//! failures into an empty or fallback value before the orchestrator sees them.

use std::path::PathBuf;

/// Top-level error type for all SiteAdvisor operations.
#[derive(Debug, thiserror::Error)]
pub enum SiteAdvisorError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during search, retrieval, or generation.
    #[error("network error: {0}")]
    Network(String),

    /// Upstream answered 429 on every attempt.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Markup or upstream JSON could not be parsed.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Text generation failed (transport, empty answer, refusal).
    #[error("generation error: {0}")]
    Generation(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (unsupported URL, empty input, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SiteAdvisorError>;

impl SiteAdvisorError {
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
