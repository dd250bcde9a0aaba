//! SQLite connection wrapper.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use leanrow_query::{ColumnType, TabularResult};
use parking_lot::Mutex;
use tokio::sync::OwnedSemaphorePermit;
use tokio_rusqlite::Connection;
use tracing::{debug, trace};

use crate::error::{SqliteError, SqliteResult};
use crate::types::{column_type, from_sqlite};

/// An idle connection waiting in the pool.
pub(crate) struct PooledConnection {
    pub conn: Arc<Connection>,
    pub created_at: Instant,
    pub last_used: Instant,
}

impl PooledConnection {
    pub fn new(conn: Arc<Connection>) -> Self {
        let now = Instant::now();
        Self {
            conn,
            created_at: now,
            last_used: now,
        }
    }
}

pub(crate) type IdleQueue = Arc<Mutex<VecDeque<PooledConnection>>>;

/// A connection checked out of a [`SqlitePool`](crate::SqlitePool).
///
/// Dropping it hands the connection back to the pool.
pub struct SqliteConnection {
    conn: Arc<Connection>,
    _permit: OwnedSemaphorePermit,
    return_to_pool: Option<IdleQueue>,
    created_at: Instant,
}

impl SqliteConnection {
    pub(crate) fn new_pooled(
        conn: Arc<Connection>,
        permit: OwnedSemaphorePermit,
        return_to_pool: Option<IdleQueue>,
        created_at: Instant,
    ) -> Self {
        Self {
            conn,
            _permit: permit,
            return_to_pool,
            created_at,
        }
    }

    /// Run a read statement and collect its rows with declared column types.
    pub async fn query(
        &self,
        sql: &str,
        params: Vec<rusqlite::types::Value>,
    ) -> SqliteResult<TabularResult> {
        let sql = sql.to_string();
        debug!(sql = %sql, params = params.len(), "Executing query");

        let (columns, types, rows) = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let (columns, types): (Vec<String>, Vec<ColumnType>) = stmt
                    .columns()
                    .iter()
                    .map(|c| (c.name().to_string(), column_type(c.decl_type())))
                    .unzip();

                let mut rows = Vec::new();
                let mut cursor = stmt.query(rusqlite::params_from_iter(params.iter()))?;
                while let Some(row) = cursor.next()? {
                    let mut values = Vec::with_capacity(types.len());
                    for (i, ty) in types.iter().enumerate() {
                        values.push(from_sqlite(row.get_ref(i)?, *ty));
                    }
                    rows.push(values);
                }
                Ok((columns, types, rows))
            })
            .await
            .map_err(SqliteError::from)?;

        Ok(TabularResult::new(columns, rows).with_column_types(types))
    }

    /// Run several statements separated by semicolons, for schema setup.
    pub async fn execute_batch(&self, sql: &str) -> SqliteResult<()> {
        let sql = sql.to_string();
        debug!(sql = %sql, "Executing batch");

        self.conn
            .call(move |conn| Ok(conn.execute_batch(&sql)?))
            .await
            .map_err(SqliteError::from)
    }

    pub fn inner(&self) -> &Connection {
        &self.conn
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if let Some(pool) = self.return_to_pool.take() {
            trace!("Returning connection to pool");
            pool.lock().push_back(PooledConnection {
                conn: Arc::clone(&self.conn),
                created_at: self.created_at,
                last_used: Instant::now(),
            });
        }
    }
}
