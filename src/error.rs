use std::path::Path;
use std::time::Duration;

use thiserror::Error;

/// Main error type for the batch converter
#[derive(Error, Debug)]
pub enum ConverterError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid access code")]
    Unauthorized,

    #[error("Storage error: {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive not found for session: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConverterError {
    /// Wrap an I/O error with the operation and path it happened on
    pub fn storage(context: impl Into<String>, path: &Path, source: std::io::Error) -> Self {
        ConverterError::Storage {
            context: format!("{} {}", context.into(), path.display()),
            source,
        }
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ConverterError::Validation(_) => "validation",
            ConverterError::Unauthorized => "unauthorized",
            ConverterError::Storage { .. } => "storage",
            ConverterError::NotFound(_) => "not_found",
            ConverterError::Config(_) => "config",
            ConverterError::Io(_) => "io",
            ConverterError::Internal(_) => "internal",
        }
    }
}

/// Failure of a single transcode job.
///
/// These never escape a batch: the batch converter turns them into
/// `TranscodeOutcome::Failure` entries.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranscodeFault {
    #[error("Failed to start codec engine: {0}")]
    Spawn(String),

    #[error("{0}")]
    Engine(String),

    #[error("Conversion timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Output could not be written: {0}")]
    Io(String),

    #[error("Conversion aborted: {0}")]
    Aborted(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ConverterError>;
