//! The data-access boundary: executing a statement and getting rows back.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::QueryResult;
use crate::row::ColumnType;
use crate::sql::DatabaseType;
use crate::value::Value;

/// A boxed future for async operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Raw tabular result of one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularResult {
    /// Column names in result order.
    pub columns: Vec<String>,
    /// Declared column types, parallel to `columns`. May be empty.
    pub column_types: Vec<ColumnType>,
    /// Row values, each parallel to `columns`.
    pub rows: Vec<Vec<Value>>,
}

impl TabularResult {
    /// Create a result with untyped columns.
    pub fn new<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: Vec<Vec<Value>>,
    ) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            column_types: Vec::new(),
            rows,
        }
    }

    /// Attach the column types reported by the driver.
    pub fn with_column_types(mut self, column_types: Vec<ColumnType>) -> Self {
        self.column_types = column_types;
        self
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the result has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Executes SQL statements against a data source.
///
/// Implementations bind `params` positionally and report driver failures
/// as [`QueryError::execution`](crate::QueryError::execution) errors.
///
/// Concurrent calls are allowed; a pooled implementation runs each on its
/// own connection.
pub trait QueryRunner: Send + Sync {
    /// Execute a read statement.
    fn execute<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, QueryResult<TabularResult>>;

    /// The dialect statements for this runner must be generated in.
    fn database_type(&self) -> DatabaseType;
}

impl<R: QueryRunner + ?Sized> QueryRunner for Arc<R> {
    fn execute<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, QueryResult<TabularResult>> {
        (**self).execute(sql, params)
    }

    fn database_type(&self) -> DatabaseType {
        (**self).database_type()
    }
}

impl<R: QueryRunner + ?Sized> QueryRunner for &R {
    fn execute<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, QueryResult<TabularResult>> {
        (**self).execute(sql, params)
    }

    fn database_type(&self) -> DatabaseType {
        (**self).database_type()
    }
}

/// Records the SQL text of every statement a request issues, in order.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct QueryLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl QueryLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a statement.
    pub fn record(&self, sql: &str) {
        self.entries.lock().push(sql.to_string());
    }

    /// Snapshot of the recorded statements.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Number of recorded statements.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Forget every recorded statement.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Execute a statement, logging it and recording it in `log`.
pub(crate) async fn dispatch(
    runner: &dyn QueryRunner,
    log: Option<&QueryLog>,
    sql: &str,
    params: &[Value],
) -> QueryResult<TabularResult> {
    debug!(sql = %sql, params = params.len(), "Executing statement");
    if let Some(log) = log {
        log.record(sql);
    }
    runner.execute(sql, params).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tabular_result() {
        let result = TabularResult::new(
            ["id", "name"],
            vec![vec![Value::Int(1), Value::from("a")]],
        );
        assert_eq!(result.len(), 1);
        assert!(!result.is_empty());
        assert_eq!(result.column_index("name"), Some(1));
        assert_eq!(result.column_index("nope"), None);
        assert!(result.column_types.is_empty());
    }

    #[test]
    fn test_query_log_shared_between_clones() {
        let log = QueryLog::new();
        let other = log.clone();
        log.record("SELECT 1");
        other.record("SELECT 2");
        assert_eq!(log.entries(), vec!["SELECT 1", "SELECT 2"]);
        assert_eq!(other.len(), 2);
        other.clear();
        assert!(log.is_empty());
    }
}
