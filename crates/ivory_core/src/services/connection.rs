//! Database connection pooling with deadpool-postgres.
//!
//! Provides connection management with:
//! - Bounded retry-with-delay while the database comes up
//! - Connection validation on pool creation
//! - Pool status reporting
//! - The `SqlSession` seam used by query and schema services

use crate::error::IvoryError;
use crate::models::{ColumnInfo, ConnectionConfig, PoolStatus, TextRow};

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::{NoTls, SimpleQueryMessage};

/// How long a request waits for a free connection before failing.
const POOL_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// The statements the query and schema services need from a connection.
///
/// Values come back over the simple-query protocol, i.e. as text, and are
/// typed afterwards from the column metadata that `describe` returns.
#[async_trait]
pub trait SqlSession: Send + Sync {
    /// Describe the result columns of a single statement without running it.
    async fn describe(&self, sql: &str) -> Result<Vec<ColumnInfo>, IvoryError>;

    /// Run SQL verbatim and collect every returned row as text.
    async fn query_text(&self, sql: &str) -> Result<Vec<TextRow>, IvoryError>;

    /// Run SQL verbatim and return the affected-row count of the last command.
    async fn execute_text(&self, sql: &str) -> Result<u64, IvoryError>;
}

/// Run `op` up to `attempts` times, sleeping `delay` between failures.
///
/// Returns the first success or the last error. No delay follows the final
/// failure. An attempt count of zero still makes one attempt.
pub async fn retry_with_delay<T, F, Fut>(
    attempts: u32,
    delay: Duration,
    mut op: F,
) -> Result<T, IvoryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, IvoryError>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                tracing::warn!(attempt, attempts, error = %e, "Failed to connect to postgres");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// The pooled connection to the administered database.
///
/// Owned for the lifetime of the process and closed once at shutdown.
pub struct ConnectionPool {
    /// Original connection configuration
    config: Arc<ConnectionConfig>,
    /// The actual connection pool
    pool: Pool,
}

impl ConnectionPool {
    /// Create the pool and wait until the database accepts a connection.
    ///
    /// Tries `connection_attempts` times, pausing `delay_between_attempts`
    /// between failures.
    pub async fn connect(
        config: ConnectionConfig,
        password: Option<&str>,
    ) -> Result<Self, IvoryError> {
        config.validate().map_err(IvoryError::config)?;

        let pool = Self::build_pool(&config, password)?;
        let attempts = config.options.connection_attempts;
        let delay = config.options.delay_between_attempts;

        tracing::debug!(url = %config.display_url(), attempts, "Connecting to postgres");

        retry_with_delay(attempts, delay, |attempt| {
            let pool = pool.clone();
            async move {
                tracing::debug!(attempt, "Validating postgres connection");
                let client = pool.get().await.map_err(|e| {
                    IvoryError::connection(format!("connect to postgres: {e}"))
                })?;
                client.execute("SELECT 1", &[]).await.map_err(|e| {
                    IvoryError::connection_with_source("connection validation failed", e)
                })?;
                Ok(())
            }
        })
        .await?;

        tracing::info!(
            host = %config.host,
            database = %config.database,
            "Connection pool created successfully"
        );

        Ok(Self { config: Arc::new(config), pool })
    }

    /// Create the pool without contacting the database.
    ///
    /// Connections are opened on first use.
    pub fn build(config: ConnectionConfig, password: Option<&str>) -> Result<Self, IvoryError> {
        config.validate().map_err(IvoryError::config)?;
        let pool = Self::build_pool(&config, password)?;
        Ok(Self { config: Arc::new(config), pool })
    }

    fn build_pool(config: &ConnectionConfig, password: Option<&str>) -> Result<Pool, IvoryError> {
        let connect_timeout = Duration::from_secs(config.options.connect_timeout_secs as u64);

        let mut pg_config = tokio_postgres::Config::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.username);
        if let Some(password) = password {
            pg_config.password(password);
        }
        pg_config.application_name(&config.options.application_name);
        pg_config.connect_timeout(connect_timeout);
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(60));
        if let Some(timeout) = config.options.statement_timeout {
            pg_config.options(&format!("-c statement_timeout={}", timeout.as_millis()));
        }

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig { recycling_method: RecyclingMethod::Fast },
        );

        Pool::builder(manager)
            .max_size(config.options.pool_size)
            .wait_timeout(Some(POOL_WAIT_TIMEOUT))
            .create_timeout(Some(connect_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| IvoryError::connection(format!("failed to create pool: {e}")))
    }

    /// Get the connection configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Acquire a connection from the pool.
    pub async fn get(&self) -> Result<PooledConnection, IvoryError> {
        let client = self.pool.get().await?;
        Ok(PooledConnection { client })
    }

    /// Get current pool status.
    pub fn status(&self) -> PoolStatus {
        let status = self.pool.status();
        PoolStatus {
            max_size: status.max_size,
            size: status.size,
            available: status.available as isize,
            waiting: status.waiting,
        }
    }

    /// Close the pool, dropping all connections.
    pub fn close(&self) {
        self.pool.close();
        tracing::info!(database = %self.config.database, "Connection pool closed");
    }

    /// Check if the pool is closed.
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

/// A connection acquired from the pool.
///
/// Automatically returns to the pool when dropped. Session settings made
/// through it stay on the same backend until then.
pub struct PooledConnection {
    client: deadpool_postgres::Client,
}

impl PooledConnection {
    /// Close this connection instead of returning it to the pool.
    ///
    /// Used when session state could not be restored.
    pub fn discard(self) {
        drop(deadpool_postgres::Client::take(self.client));
    }
}

#[async_trait]
impl SqlSession for PooledConnection {
    async fn describe(&self, sql: &str) -> Result<Vec<ColumnInfo>, IvoryError> {
        let statement = self.client.prepare(sql).await?;
        Ok(statement
            .columns()
            .iter()
            .map(|col| ColumnInfo::new(col.name(), col.type_().oid(), col.type_().name()))
            .collect())
    }

    async fn query_text(&self, sql: &str) -> Result<Vec<TextRow>, IvoryError> {
        let messages = self.client.simple_query(sql).await?;
        Ok(messages
            .into_iter()
            .filter_map(|message| match message {
                SimpleQueryMessage::Row(row) => {
                    Some((0..row.len()).map(|i| row.get(i).map(str::to_string)).collect())
                }
                _ => None,
            })
            .collect())
    }

    async fn execute_text(&self, sql: &str) -> Result<u64, IvoryError> {
        let messages = self.client.simple_query(sql).await?;
        Ok(messages
            .iter()
            .rev()
            .find_map(|message| match message {
                SimpleQueryMessage::CommandComplete(count) => Some(*count),
                _ => None,
            })
            .unwrap_or(0))
    }
}
