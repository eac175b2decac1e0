//! # Error Types
//!
//! This module defines error types used throughout the printbridge library.
//!
//! Every failure eventually collapses to a [`PrintResult`](crate::job::PrintResult)
//! with `success: false` at the boundary the caller talks to. The variant is
//! kept alongside the message so code that wants to branch on the cause can
//! do so without parsing text.

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, PrintError>;

/// Main error type for printbridge operations
#[derive(Debug, Error)]
pub enum PrintError {
    /// A required field is missing or a value is out of range.
    ///
    /// The message is shown to the caller verbatim (e.g. "URL is required").
    #[error("{0}")]
    Validation(String),

    /// Network-level failure talking to a remote party (agent, hub, callback)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The rendering engine or the native print subsystem failed
    #[error("{0}")]
    Execution(String),

    /// Invalid or unusable configuration (e.g. port already bound)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding error wrapper
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of a [`PrintError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Transport,
    Execution,
    Configuration,
}

impl PrintError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PrintError::Validation(_) => ErrorKind::Validation,
            PrintError::Transport(_) => ErrorKind::Transport,
            PrintError::Execution(_) => ErrorKind::Execution,
            PrintError::Configuration(_) => ErrorKind::Configuration,
            PrintError::Io(_) | PrintError::Json(_) => ErrorKind::Execution,
        }
    }
}

impl From<reqwest::Error> for PrintError {
    fn from(e: reqwest::Error) -> Self {
        PrintError::Transport(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for PrintError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        PrintError::Transport(e.to_string())
    }
}
