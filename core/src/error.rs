//! Error types for tsbench-core

use thiserror::Error;

use crate::metrics::MetricsError;
use crate::query::SourceError;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error, reported synchronously at setup time
    #[error("configuration error: {0}")]
    Config(String),

    /// The shared cancellation signal fired before the operation completed
    #[error("run cancelled")]
    Cancelled,

    /// The work source failed fatally (not a per-row decode error)
    #[error("work source failed: {0}")]
    Source(#[from] SourceError),

    /// Metrics recording failed (exact aggregator over capacity)
    #[error(transparent)]
    Metrics(#[from] MetricsError),

    /// Worker pool protocol violation
    #[error("worker pool error: {0}")]
    Pool(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<crate::config::ConfigError> for Error {
    fn from(error: crate::config::ConfigError) -> Self {
        Error::Config(error.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
