//! [`QueryRunner`] over a [`SqlitePool`].

use leanrow_query::{BoxFuture, DatabaseType, QueryError, QueryResult, QueryRunner, TabularResult, Value};
use tracing::{debug, instrument};

use crate::config::SqliteConfig;
use crate::error::SqliteResult;
use crate::pool::SqlitePool;
use crate::types::to_sqlite;

/// Runs leanrow statements on SQLite.
///
/// Every statement checks out its own connection, so concurrent sibling
/// lookups never share one.
#[derive(Debug, Clone)]
pub struct SqliteRunner {
    pool: SqlitePool,
}

impl SqliteRunner {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool for `url` with default settings.
    pub async fn connect(url: &str) -> SqliteResult<Self> {
        let pool = SqlitePool::new(SqliteConfig::from_url(url)?).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    #[instrument(skip(self, params), fields(params = params.len()))]
    async fn query(&self, sql: &str, params: &[Value]) -> QueryResult<TabularResult> {
        let conn = self.pool.get().await.map_err(|e| {
            QueryError::execution(sql, e).with_context("acquire connection")
        })?;
        let params = params.iter().map(to_sqlite).collect();
        let result = conn
            .query(sql, params)
            .await
            .map_err(|e| QueryError::execution(sql, e))?;
        debug!(rows = result.len(), "Query completed");
        Ok(result)
    }

    /// Run semicolon separated statements, e.g. to create a schema or seed
    /// data. Not used by eager loading.
    #[instrument(skip(self, sql))]
    pub async fn execute_batch(&self, sql: &str) -> QueryResult<()> {
        let conn = self.pool.get().await.map_err(QueryError::from)?;
        conn.execute_batch(sql)
            .await
            .map_err(|e| QueryError::execution(sql, e))
    }
}

impl QueryRunner for SqliteRunner {
    fn execute<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, QueryResult<TabularResult>> {
        Box::pin(self.query(sql, params))
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }
}
