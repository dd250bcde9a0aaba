//! Connection pool for SQLite.
//!
//! - File databases: connections are opened on demand up to
//!   `max_connections` and reused; sibling eager loads each get their own.
//! - In-memory databases: every connection would see its own empty
//!   database, so the pool opens one and hands out shared handles to it.
//!   Statements on it run one at a time.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_rusqlite::Connection;
use tracing::{debug, info, trace};

use crate::config::SqliteConfig;
use crate::connection::{IdleQueue, PooledConnection, SqliteConnection};
use crate::error::{SqliteError, SqliteResult};

/// A connection pool for SQLite.
///
/// ```rust,ignore
/// use leanrow_sqlite::{SqliteConfig, SqlitePool};
///
/// let pool = SqlitePool::new(SqliteConfig::file("data.db")).await?;
/// let conn = pool.get().await?;
/// // returned to the pool on drop
/// ```
#[derive(Clone)]
pub struct SqlitePool {
    config: Arc<SqliteConfig>,
    semaphore: Arc<Semaphore>,
    idle_connections: IdleQueue,
    /// The single connection of an in-memory database.
    shared: Option<Arc<Connection>>,
    pool_config: Arc<PoolConfig>,
    stats: Arc<Mutex<PoolStats>>,
}

impl std::fmt::Debug for SqlitePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlitePool")
            .field("path", &self.config.path)
            .field("pool_config", &self.pool_config)
            .field("idle", &self.idle_count())
            .finish()
    }
}

/// Statistics about pool usage.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub reuses: u64,
    pub opens: u64,
    /// Connections closed for exceeding their idle time or lifetime.
    pub expirations: u64,
}

impl SqlitePool {
    pub async fn new(config: SqliteConfig) -> SqliteResult<Self> {
        Self::with_pool_config(config, PoolConfig::default()).await
    }

    pub async fn with_pool_config(
        config: SqliteConfig,
        pool_config: PoolConfig,
    ) -> SqliteResult<Self> {
        if pool_config.max_connections == 0 {
            return Err(SqliteError::config("max_connections must be at least 1"));
        }

        // Fails early on an unopenable path.
        let first = Arc::new(Self::open_connection(&config).await?);
        let memory = config.path.is_memory();

        let pool = Self {
            config: Arc::new(config),
            semaphore: Arc::new(Semaphore::new(pool_config.max_connections)),
            idle_connections: Arc::new(Mutex::new(VecDeque::with_capacity(
                pool_config.max_connections,
            ))),
            shared: memory.then(|| Arc::clone(&first)),
            pool_config: Arc::new(pool_config),
            stats: Arc::new(Mutex::new(PoolStats {
                opens: 1,
                ..PoolStats::default()
            })),
        };

        if !memory {
            pool.idle_connections
                .lock()
                .push_back(PooledConnection::new(first));
            let warm = pool.pool_config.min_connections.saturating_sub(1);
            if warm > 0 {
                debug!(connections = warm, "Pre-warming pool");
            }
            for _ in 0..warm {
                let conn = Self::open_connection(&pool.config).await?;
                pool.stats.lock().opens += 1;
                pool.idle_connections
                    .lock()
                    .push_back(PooledConnection::new(Arc::new(conn)));
            }
        }

        info!(
            path = %pool.config.path.display(),
            max_connections = pool.pool_config.max_connections,
            "SQLite connection pool created"
        );
        Ok(pool)
    }

    async fn open_connection(config: &SqliteConfig) -> SqliteResult<Connection> {
        let init_sql = config.init_sql();

        let conn = match &config.path {
            crate::config::DatabasePath::Memory => Connection::open_in_memory().await?,
            crate::config::DatabasePath::File(path) => Connection::open(path).await?,
        };

        conn.call(move |conn| Ok(conn.execute_batch(&init_sql)?))
            .await?;

        Ok(conn)
    }

    fn is_expired(&self, pooled: &PooledConnection) -> bool {
        let lifetime = self
            .pool_config
            .max_lifetime
            .is_some_and(|max| pooled.created_at.elapsed() > max);
        let idle = self
            .pool_config
            .idle_timeout
            .is_some_and(|max| pooled.last_used.elapsed() > max);
        lifetime || idle
    }

    /// Check out a connection, waiting for a free slot when all are in use.
    pub async fn get(&self) -> SqliteResult<SqliteConnection> {
        trace!("Acquiring connection from pool");

        let acquire = self.semaphore.clone().acquire_owned();
        let permit = match self.pool_config.connection_timeout {
            Some(timeout) => tokio::time::timeout(timeout, acquire)
                .await
                .map_err(|_| {
                    SqliteError::pool(format!("timed out after {:?} waiting for a connection", timeout))
                })?,
            None => acquire.await,
        }
        .map_err(|e| SqliteError::pool(format!("failed to acquire permit: {}", e)))?;

        if let Some(shared) = &self.shared {
            self.stats.lock().reuses += 1;
            return Ok(SqliteConnection::new_pooled(
                Arc::clone(shared),
                permit,
                None,
                Instant::now(),
            ));
        }

        let reused = {
            let mut idle = self.idle_connections.lock();
            let mut found = None;
            while let Some(pooled) = idle.pop_front() {
                if self.is_expired(&pooled) {
                    self.stats.lock().expirations += 1;
                    continue;
                }
                found = Some(pooled);
                break;
            }
            found
        };

        if let Some(pooled) = reused {
            self.stats.lock().reuses += 1;
            return Ok(SqliteConnection::new_pooled(
                pooled.conn,
                permit,
                Some(Arc::clone(&self.idle_connections)),
                pooled.created_at,
            ));
        }

        debug!("No idle connections, opening new connection");
        let conn = Self::open_connection(&self.config).await?;
        self.stats.lock().opens += 1;
        Ok(SqliteConnection::new_pooled(
            Arc::new(conn),
            permit,
            Some(Arc::clone(&self.idle_connections)),
            Instant::now(),
        ))
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    pub fn pool_config(&self) -> &PoolConfig {
        &self.pool_config
    }

    pub fn stats(&self) -> PoolStats {
        self.stats.lock().clone()
    }

    /// Connections that could be checked out right now without waiting.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn idle_count(&self) -> usize {
        self.idle_connections.lock().len()
    }

    pub fn builder() -> SqlitePoolBuilder {
        SqlitePoolBuilder::new()
    }
}

/// Pool sizing and recycling.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: usize,
    /// Connections opened up front (file databases only).
    pub min_connections: usize,
    /// How long [`SqlitePool::get`] waits for a free connection.
    pub connection_timeout: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            min_connections: 1,
            connection_timeout: Some(Duration::from_secs(30)),
            idle_timeout: Some(Duration::from_secs(300)),
            max_lifetime: Some(Duration::from_secs(1800)),
        }
    }
}

/// Builder for a [`SqlitePool`].
#[derive(Debug, Default)]
pub struct SqlitePoolBuilder {
    config: Option<SqliteConfig>,
    url: Option<String>,
    pool_config: PoolConfig,
}

impl SqlitePoolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn config(mut self, config: SqliteConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn max_connections(mut self, n: usize) -> Self {
        self.pool_config.max_connections = n;
        self
    }

    pub fn min_connections(mut self, n: usize) -> Self {
        self.pool_config.min_connections = n;
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.connection_timeout = Some(timeout);
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.idle_timeout = Some(timeout);
        self
    }

    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.pool_config.max_lifetime = Some(lifetime);
        self
    }

    pub async fn build(self) -> SqliteResult<SqlitePool> {
        let config = match (self.config, self.url) {
            (Some(config), _) => config,
            (None, Some(url)) => SqliteConfig::from_url(url)?,
            (None, None) => return Err(SqliteError::config("no database URL or config provided")),
        };

        SqlitePool::with_pool_config(config, self.pool_config).await
    }
}
