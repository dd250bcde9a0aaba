//! The session: a runner plus the metadata and settings requests run with.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::LoaderConfig;
use crate::eager::{EagerLoader, EagerLoads};
use crate::error::QueryResult;
use crate::row::{DefaultRowFactory, RowFactory, RowRef};
use crate::runner::{QueryLog, QueryRunner};
use crate::schema::SchemaMetadata;
use crate::sql::DatabaseType;
use crate::value::Value;

/// Everything a request needs besides the request itself.
///
/// A session holds no per-request state; any number of requests may run
/// through it, concurrently.
pub struct Session<R> {
    runner: R,
    schema: Option<Arc<dyn SchemaMetadata>>,
    factory: Arc<dyn RowFactory>,
    config: LoaderConfig,
}

impl<R> fmt::Debug for Session<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("has_schema", &self.schema.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl<R: QueryRunner> Session<R> {
    /// Create a session over `runner` with no schema.
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            schema: None,
            factory: Arc::new(DefaultRowFactory),
            config: LoaderConfig::default(),
        }
    }

    /// Resolve declared associations against `schema`.
    pub fn with_schema(self, schema: impl SchemaMetadata + 'static) -> Self {
        self.with_shared_schema(Arc::new(schema))
    }

    /// Share an existing schema between sessions.
    pub fn with_shared_schema(mut self, schema: Arc<dyn SchemaMetadata>) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Materialize rows through `factory` instead of the default.
    pub fn with_row_factory(mut self, factory: impl RowFactory + 'static) -> Self {
        self.factory = Arc::new(factory);
        self
    }

    /// Set loader options.
    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// The underlying query runner.
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// The schema metadata, when one is configured.
    pub fn schema(&self) -> Option<&dyn SchemaMetadata> {
        self.schema.as_deref()
    }

    /// The loader options.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Dialect statements are generated in.
    pub fn database_type(&self) -> DatabaseType {
        self.config
            .database_type
            .unwrap_or_else(|| self.runner.database_type())
    }

    /// An eager loader over this session's collaborators.
    pub fn loader<'a>(&'a self, log: Option<&'a QueryLog>) -> EagerLoader<'a> {
        let mut loader = EagerLoader::new(&self.runner)
            .with_row_factory(self.factory.as_ref())
            .with_config(self.config)
            .with_query_log(log);
        if let Some(schema) = self.schema.as_deref() {
            loader = loader.with_schema(schema);
        }
        loader
    }

    /// Run a root statement and eager load `loads` onto its rows.
    ///
    /// The tree is validated before the root statement is issued.
    pub async fn fetch(
        &self,
        sql: &str,
        params: &[Value],
        model: Option<&str>,
        loads: &EagerLoads,
        log: Option<&QueryLog>,
    ) -> QueryResult<Vec<RowRef>> {
        let loader = self.loader(log);
        loader.validate(model, loads)?;

        let rows = loader.fetch_rows(sql, params, &loads.slot_names()).await?;
        debug!(model = ?model, rows = rows.len(), "Loaded root rows");

        loader.load(model, &rows, loads).await?;
        Ok(rows)
    }
}

/// Single-pass iterator over the rows of one execution.
#[derive(Debug)]
pub struct Rows {
    inner: std::vec::IntoIter<RowRef>,
}

impl Rows {
    pub(crate) fn new(rows: Vec<RowRef>) -> Self {
        Self {
            inner: rows.into_iter(),
        }
    }
}

impl Iterator for Rows {
    type Item = RowRef;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Rows {}
