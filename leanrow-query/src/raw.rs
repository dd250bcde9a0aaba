//! Raw SQL queries with named binds.
//!
//! SQL references binds as `%{name}`. Every occurrence becomes a placeholder
//! for the session's dialect and the value is bound in order of appearance,
//! so values are never interpolated into the SQL text.
//!
//! ```rust
//! use leanrow_query::{DatabaseType, RawQuery, Value};
//!
//! let query = RawQuery::new("SELECT * FROM widgets WHERE cat_id = %{cat} AND id IN (%{ids})")
//!     .bind("cat", 5)
//!     .bind("ids", vec![1, 2, 3]);
//!
//! let (sql, params) = query.compile(DatabaseType::PostgreSQL).unwrap();
//! assert_eq!(sql, "SELECT * FROM widgets WHERE cat_id = $1 AND id IN ($2, $3, $4)");
//! assert_eq!(params.len(), 4);
//! ```
//!
//! Hostile input stays a parameter:
//!
//! ```rust
//! use leanrow_query::{DatabaseType, RawQuery};
//!
//! let query = RawQuery::new("SELECT * FROM users WHERE name = %{name}")
//!     .bind("name", "'; DROP TABLE users; --");
//! let (sql, params) = query.compile(DatabaseType::SQLite).unwrap();
//! assert!(!sql.contains("DROP TABLE"));
//! assert_eq!(params.len(), 1);
//! ```

use indexmap::IndexMap;
use tracing::debug;

use crate::eager::{EagerLoadBuilder, EagerLoads};
use crate::error::QueryResult;
use crate::row::RowRef;
use crate::runner::{QueryLog, QueryRunner};
use crate::session::{Rows, Session};
use crate::sql::{DatabaseType, SqlBuilder};
use crate::value::Value;

/// A read query from caller written SQL.
///
/// The query is a plain value: running it does not consume or change it, and
/// running it again issues every statement again.
#[derive(Debug, Clone, Default)]
pub struct RawQuery {
    sql: String,
    binds: IndexMap<String, Value>,
    model: Option<String>,
    eager_loads: EagerLoads,
    log: Option<QueryLog>,
}

impl RawQuery {
    /// Create a query from SQL that may reference `%{name}` binds.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Self::default()
        }
    }

    /// Bind a value to `%{name}`.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.binds.insert(name.into(), value.into());
        self
    }

    /// Bind several values at once.
    pub fn binds<K, V>(mut self, binds: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        for (name, value) in binds {
            self.binds.insert(name.into(), value.into());
        }
        self
    }

    /// The model the rows belong to; eager loads resolve against it.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Record every statement this query issues in `log`.
    pub fn query_log(mut self, log: QueryLog) -> Self {
        self.log = Some(log);
        self
    }

    /// The SQL template as given.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The eager-load tree attached to this query.
    pub fn eager_loads(&self) -> &EagerLoads {
        &self.eager_loads
    }

    /// Resolve binds into dialect placeholders and a parameter list.
    pub fn compile(&self, db_type: DatabaseType) -> QueryResult<(String, Vec<Value>)> {
        let mut builder = SqlBuilder::new(db_type);
        builder.push_template(&self.sql, &self.binds)?;
        Ok(builder.build())
    }

    /// Execute and return every row with its eager loads attached.
    pub async fn run<R: QueryRunner>(&self, session: &Session<R>) -> QueryResult<Vec<RowRef>> {
        let (sql, params) = self.compile(session.database_type())?;
        debug!(model = ?self.model, loads = self.eager_loads.len(), "Running raw query");
        session
            .fetch(
                &sql,
                &params,
                self.model.as_deref(),
                &self.eager_loads,
                self.log.as_ref(),
            )
            .await
    }

    /// Execute and iterate the rows once.
    pub async fn each<R: QueryRunner>(&self, session: &Session<R>) -> QueryResult<Rows> {
        self.run(session).await.map(Rows::new)
    }
}

impl EagerLoadBuilder for RawQuery {
    fn eager_loads_mut(&mut self) -> &mut EagerLoads {
        &mut self.eager_loads
    }
}
