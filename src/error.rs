use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Main application error type for infrastructure failures.
///
/// Validation findings are never reported through this type: they are data
/// carried by [`crate::ValidationResult`]. Only storage, filesystem, monitor
/// and configuration failures end up here.
#[derive(Error, Debug)]
pub enum SarError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Monitor error: {0}")]
    Monitor(#[from] MonitorError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("SAR validation failed: {summary}")]
    ValidationFailed { summary: String },

    #[error("Logging initialization failed: {0}")]
    Logging(String),
}

/// Errors raised by the storage collaborators of the pipeline.
///
/// The pipeline never constructs these itself; it propagates whatever the
/// transaction manager or repository returned, after rolling back.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Transaction could not be started: {details}")]
    Begin { details: String },

    #[error("Payload could not be saved for {correlation_id}: {details}")]
    Save {
        correlation_id: String,
        details: String,
    },

    #[error("Transaction commit failed: {details}")]
    Commit { details: String },

    #[error("Transaction rollback failed: {details}")]
    Rollback { details: String },

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Live-change monitor errors
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Polling interval must be positive")]
    InvalidInterval,

    #[error("Unable to read watched document {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<ConfigError> for SarError {
    fn from(err: ConfigError) -> Self {
        SarError::Config(err.to_string())
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, SarError>;

/// Persistence result type alias
pub type PersistenceResult<T> = std::result::Result<T, PersistenceError>;

/// Monitor result type alias
pub type MonitorResult<T> = std::result::Result<T, MonitorError>;
