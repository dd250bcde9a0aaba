//! Root queries built from model metadata.

use tracing::debug;

use crate::eager::{EagerLoadBuilder, EagerLoads};
use crate::error::{QueryError, QueryResult};
use crate::row::RowRef;
use crate::runner::{QueryLog, QueryRunner};
use crate::schema::{OrderByField, SchemaMetadata, Scope};
use crate::session::{Rows, Session};
use crate::sql::{DatabaseType, SqlBuilder};
use crate::value::Value;

/// `SELECT .. FROM <model table>` with an optional scope and pagination.
///
/// ```rust
/// use leanrow_query::{DatabaseType, ModelQuery, ModelSpec, OrderByField, SchemaRegistry};
///
/// let schema = SchemaRegistry::new().model(ModelSpec::new("Widget", "widgets").primary_key("id"));
/// let query = ModelQuery::new("Widget")
///     .filter("price < %{max}")
///     .bind("max", 10)
///     .order_by(OrderByField::asc("name"))
///     .limit(20);
///
/// let (sql, params) = query.compile(&schema, DatabaseType::PostgreSQL).unwrap();
/// assert_eq!(
///     sql,
///     "SELECT * FROM \"widgets\" WHERE (price < $1) ORDER BY \"name\" ASC LIMIT 20"
/// );
/// assert_eq!(params.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct ModelQuery {
    model: String,
    scope: Scope,
    limit: Option<u64>,
    offset: Option<u64>,
    eager_loads: EagerLoads,
    log: Option<QueryLog>,
}

impl ModelQuery {
    /// Start a query over every row of `model`'s table.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            scope: Scope::default(),
            limit: None,
            offset: None,
            eager_loads: EagerLoads::default(),
            log: None,
        }
    }

    /// Replace the scope.
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Re-select columns; the primary key is always included.
    pub fn select<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.scope = self.scope.select(columns);
        self
    }

    /// Add a `WHERE` condition fragment; may reference `%{name}` binds.
    pub fn filter(mut self, condition: impl Into<String>) -> Self {
        self.scope = self.scope.filter(condition);
        self
    }

    /// Bind a value referenced by a condition as `%{name}`.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.scope = self.scope.bind(name, value);
        self
    }

    /// Append an `ORDER BY` term.
    pub fn order_by(mut self, field: OrderByField) -> Self {
        self.scope = self.scope.order_by(field);
        self
    }

    /// Limit the number of root rows.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first `offset` root rows.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Record every statement this query issues into `log`.
    pub fn query_log(mut self, log: QueryLog) -> Self {
        self.log = Some(log);
        self
    }

    /// The model the query reads.
    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// The eager-load tree attached to this query.
    pub fn eager_loads(&self) -> &EagerLoads {
        &self.eager_loads
    }

    /// Build the root statement for `db_type` from the model's table and scope.
    pub fn compile(
        &self,
        schema: &dyn SchemaMetadata,
        db_type: DatabaseType,
    ) -> QueryResult<(String, Vec<Value>)> {
        let table = schema.table_name(&self.model)?;
        let primary_key = match self.scope.select {
            Some(_) => Some(schema.primary_key(&self.model)?),
            None => None,
        };
        let required: Vec<&str> = primary_key.as_deref().into_iter().collect();

        let mut builder = SqlBuilder::new(db_type);
        builder.push("SELECT ");
        self.scope.push_select(&mut builder, &required);
        builder.push(" FROM ").push_identifier(&table);
        self.scope.push_where(&mut builder)?;
        self.scope.push_order_by(&mut builder);

        match (self.limit, self.offset) {
            (Some(limit), _) => {
                builder.push(format!(" LIMIT {}", limit));
            }
            // SQLite and MySQL reject OFFSET without LIMIT.
            (None, Some(_)) => match db_type {
                DatabaseType::SQLite => {
                    builder.push(" LIMIT -1");
                }
                DatabaseType::MySQL => {
                    builder.push(format!(" LIMIT {}", u64::MAX));
                }
                DatabaseType::PostgreSQL => {}
            },
            (None, None) => {}
        }
        if let Some(offset) = self.offset {
            builder.push(format!(" OFFSET {}", offset));
        }

        Ok(builder.build())
    }

    /// Execute and return every row with its eager loads attached.
    pub async fn run<R: QueryRunner>(&self, session: &Session<R>) -> QueryResult<Vec<RowRef>> {
        let schema = session.schema().ok_or_else(|| {
            QueryError::configuration("model queries require schema metadata on the session")
                .with_model(&self.model)
        })?;
        let (sql, params) = self.compile(schema, session.database_type())?;
        debug!(model = %self.model, loads = self.eager_loads.len(), "Running model query");
        session
            .fetch(
                &sql,
                &params,
                Some(&self.model),
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

impl EagerLoadBuilder for ModelQuery {
    fn eager_loads_mut(&mut self) -> &mut EagerLoads {
        &mut self.eager_loads
    }
}
