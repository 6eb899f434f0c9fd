//! TimescaleDB client backed by a deadpool-postgres connection pool

use std::time::{Duration, Instant};

use async_trait::async_trait;
use deadpool_postgres::{Pool, PoolConfig, Runtime};
use tokio_postgres::NoTls;

use super::{ClientError, QueryClient, QueryResponse, MAX_ATTEMPTS};

const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for [`TimescaleClient`]
#[derive(Debug, Clone)]
pub struct TimescaleConfig {
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Database host
    pub host: String,
    /// Database port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Connection pool size; sized to the worker count so every worker can
    /// hold a connection without queueing on the pool
    pub pool_size: usize,
    /// Per-attempt deadline for a single query execution
    pub query_timeout: Duration,
}

/// TimescaleDB client holding a connection pool
pub struct TimescaleClient {
    pool: Pool,
    query_timeout: Duration,
}

impl TimescaleClient {
    /// Build the connection pool from the given settings
    ///
    /// Connections are established lazily on first use, so this does not
    /// touch the network; use [`QueryClient::ping`] to verify reachability.
    pub fn connect(config: &TimescaleConfig) -> Result<Self, ClientError> {
        if config.pool_size < 1 {
            return Err(ClientError::Config(
                "pool size must be greater than 0".into(),
            ));
        }

        let mut pg = deadpool_postgres::Config::new();
        pg.user = Some(config.user.clone());
        pg.password = Some(config.password.clone());
        pg.host = Some(config.host.clone());
        pg.port = Some(config.port);
        pg.dbname = Some(config.dbname.clone());
        pg.pool = Some(PoolConfig::new(config.pool_size));

        let pool = pg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|error| ClientError::Config(error.to_string()))?;

        Ok(Self {
            pool,
            query_timeout: config.query_timeout,
        })
    }

    async fn ping_once(&self) -> Result<(), ClientError> {
        let connection = self
            .pool
            .get()
            .await
            .map_err(|error| ClientError::Pool(error.to_string()))?;

        connection
            .simple_query("SELECT 1")
            .await
            .map_err(|error| ClientError::Query(error.to_string()))?;

        Ok(())
    }

    async fn execute_once(&self, sql: &str) -> Result<(), ClientError> {
        let connection = self
            .pool
            .get()
            .await
            .map_err(|error| ClientError::Pool(error.to_string()))?;

        match tokio::time::timeout(self.query_timeout, connection.query(sql, &[])).await {
            Ok(Ok(_rows)) => Ok(()),
            Ok(Err(error)) => Err(ClientError::Query(error.to_string())),
            Err(_) => Err(ClientError::Timeout(self.query_timeout)),
        }
    }
}

#[async_trait]
impl QueryClient for TimescaleClient {
    async fn ping(&self) -> Result<(), ClientError> {
        match tokio::time::timeout(PING_TIMEOUT, self.ping_once()).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(PING_TIMEOUT)),
        }
    }

    async fn execute(&self, sql: &str) -> Result<QueryResponse, ClientError> {
        let started = Instant::now();
        let mut attempt = 1;

        loop {
            match self.execute_once(sql).await {
                Ok(()) => {
                    return Ok(QueryResponse {
                        duration: started.elapsed(),
                    })
                }
                Err(error) if error.is_transient() && attempt < MAX_ATTEMPTS => {
                    tracing::warn!(attempt, error = %error, "transient query error, retrying");
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

impl std::fmt::Debug for TimescaleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimescaleClient")
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}
