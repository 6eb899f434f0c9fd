//! Database client contract and transient-error classification
//!
//! The worker pool only depends on the [`QueryClient`] trait; the concrete
//! TimescaleDB implementation lives in [`timescale`]. Implementations must
//! retry a bounded number of times on transient failures and surface
//! non-transient or retry-exhausted errors unchanged.

mod timescale;

pub use timescale::{TimescaleClient, TimescaleConfig};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Maximum number of attempts for one query, first try included
pub const MAX_ATTEMPTS: usize = 3;

// Classified transient failures, matched as substrings of the error text.
// https://www.tigerdata.com/blog/5-common-connection-errors-in-postgresql-and-how-to-solve-them
const TRANSIENT_ERRORS: &[&str] = &[
    "conn busy",
    "connection reset",
    "connection refused",
    "timeout",
    "temporary failure",
    "server closed the connection",
    "broken pipe",
];

/// A successfully executed query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryResponse {
    /// Wall-clock duration of the query, measured from before the first
    /// attempt through retry completion
    pub duration: Duration,
}

/// Client for executing one unit of work against the database
#[async_trait]
pub trait QueryClient: Send + Sync {
    /// Check connectivity
    async fn ping(&self) -> Result<(), ClientError>;

    /// Execute the query text, retrying transient failures internally
    async fn execute(&self, sql: &str) -> Result<QueryResponse, ClientError>;
}

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Invalid client configuration
    #[error("client configuration error: {0}")]
    Config(String),

    /// The connection pool could not hand out a connection
    #[error("connection pool error: {0}")]
    Pool(String),

    /// The database rejected or failed the query
    #[error("query failed: {0}")]
    Query(String),

    /// The query did not complete within the per-attempt deadline
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
}

impl ClientError {
    /// Whether this error is worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Timeout(_) => true,
            ClientError::Pool(message) | ClientError::Query(message) => TRANSIENT_ERRORS
                .iter()
                .any(|marker| message.contains(marker)),
            ClientError::Config(_) => false,
        }
    }
}
