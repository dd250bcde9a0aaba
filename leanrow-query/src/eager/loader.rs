//! The eager-load orchestrator.
//!
//! Loading a tree happens level by level. For one level:
//!
//! 1. Resolve a planner for every sibling node.
//! 2. Run the planners, concurrently unless [`LoaderConfig::concurrent_siblings`]
//!    is off. Each issues its lookup for the whole parent batch.
//! 3. Attach every node's per-parent results to the parents' slots.
//! 4. Recurse into each node's nested tree with the rows it fetched as the
//!    new parent batch.
//!
//! Any failure aborts the whole load; rows are never handed out partially
//! loaded.

use futures::future::try_join_all;
use tracing::{trace, warn};

use super::include::EagerLoads;
use super::merge;
use super::planner::{self, AssociationPlanner, ChildGroup, Loaded};
use crate::config::LoaderConfig;
use crate::error::{QueryError, QueryResult};
use crate::row::{DefaultRowFactory, RowFactory, RowRef};
use crate::runner::{BoxFuture, QueryLog, QueryRunner, TabularResult, dispatch};
use crate::schema::SchemaMetadata;
use crate::sql::DatabaseType;
use crate::value::Value;

static DEFAULT_ROW_FACTORY: DefaultRowFactory = DefaultRowFactory;

/// Loads eager-load trees onto batches of rows.
///
/// Holds only borrowed collaborators; create one per request.
pub struct EagerLoader<'a> {
    runner: &'a dyn QueryRunner,
    schema: Option<&'a dyn SchemaMetadata>,
    factory: &'a dyn RowFactory,
    config: LoaderConfig,
    log: Option<&'a QueryLog>,
}

impl<'a> EagerLoader<'a> {
    /// Create a loader over `runner` with no schema and default config.
    pub fn new(runner: &'a dyn QueryRunner) -> Self {
        Self {
            runner,
            schema: None,
            factory: &DEFAULT_ROW_FACTORY,
            config: LoaderConfig::default(),
            log: None,
        }
    }

    /// Resolve declared associations against `schema`.
    pub fn with_schema(mut self, schema: &'a dyn SchemaMetadata) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Materialize rows through `factory` instead of the default.
    pub fn with_row_factory(mut self, factory: &'a dyn RowFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Use `config` for dispatch and dialect settings.
    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Record every executed statement into `log`.
    pub fn with_query_log(mut self, log: Option<&'a QueryLog>) -> Self {
        self.log = log;
        self
    }

    /// The dialect lookups are generated in.
    pub fn database_type(&self) -> DatabaseType {
        self.config
            .database_type
            .unwrap_or_else(|| self.runner.database_type())
    }

    /// The schema metadata, or a configuration error when none was given.
    pub fn schema(&self) -> QueryResult<&'a dyn SchemaMetadata> {
        self.schema.ok_or_else(|| {
            QueryError::configuration("eager loading declared associations requires schema metadata")
        })
    }

    /// Materialize a result with the given association slots.
    pub fn materialize(&self, result: TabularResult, slots: &[String]) -> QueryResult<Vec<RowRef>> {
        let shape = self
            .factory
            .build_row_shape(&result.columns, &result.column_types, slots);
        shape.materialize(result.rows)
    }

    /// Execute a statement and materialize its rows.
    pub async fn fetch_rows(
        &self,
        sql: &str,
        params: &[Value],
        slots: &[String],
    ) -> QueryResult<Vec<RowRef>> {
        let result = dispatch(self.runner, self.log, sql, params).await?;
        self.materialize(result, slots)
    }

    /// Resolve every node of `loads` against `model` without running anything.
    ///
    /// Surfaces unknown associations and unresolvable keys before the root
    /// query is issued. Subtrees under a polymorphic node are checked when
    /// their models are known, at load time.
    pub fn validate(&self, model: Option<&str>, loads: &EagerLoads) -> QueryResult<()> {
        loads.check_conflicts()?;
        for load in loads.iter() {
            let planner = planner::for_node(self.schema, model, load)?;
            if !load.has_nested() {
                continue;
            }
            match planner.target_model() {
                Some(target) => self.validate(Some(target), &load.nested)?,
                None if load.is_ad_hoc() => self.validate(None, &load.nested)?,
                None => {}
            }
        }
        Ok(())
    }

    /// Load `loads` onto `rows`, which belong to `model`.
    ///
    /// An empty batch issues no statements.
    pub fn load<'b>(
        &'b self,
        model: Option<&'b str>,
        rows: &'b [RowRef],
        loads: &'b EagerLoads,
    ) -> BoxFuture<'b, QueryResult<()>> {
        Box::pin(async move {
            if loads.is_empty() {
                return Ok(());
            }
            loads.check_conflicts()?;
            if rows.is_empty() {
                trace!(model = ?model, reason = "no parent rows", "Skipping eager loads");
                return Ok(());
            }

            let planners = loads
                .iter()
                .map(|load| planner::for_node(self.schema, model, load).map(|p| (load, p)))
                .collect::<QueryResult<Vec<_>>>()?;

            let loaded: Vec<Loaded> = if self.config.concurrent_siblings && planners.len() > 1 {
                try_join_all(planners.iter().map(|(_, p)| p.load(self, rows))).await?
            } else {
                let mut loaded = Vec::with_capacity(planners.len());
                for (_, p) in &planners {
                    loaded.push(p.load(self, rows).await?);
                }
                loaded
            };

            // Every sibling is attached before any subtree is entered.
            let mut next: Vec<(&EagerLoads, ChildGroup)> = Vec::new();
            for ((load, planner), loaded) in planners.iter().zip(loaded) {
                let Loaded {
                    results,
                    groups,
                    stats,
                } = loaded;
                trace!(
                    association = %load.slot_name(),
                    parents = stats.parents,
                    children = stats.children,
                    matched = stats.matched,
                    "Merged association"
                );
                if stats.ambiguous > 0 && self.config.warn_on_ambiguous_single {
                    warn!(
                        association = %load.slot_name(),
                        kind = %planner.kind(),
                        parents = stats.ambiguous,
                        "Single-row association matched several rows; kept the first"
                    );
                }
                merge::attach(rows, load.slot_name(), results)?;

                if load.has_nested() {
                    next.extend(groups.into_iter().map(|group| (&load.nested, group)));
                }
            }

            if self.config.concurrent_siblings && next.len() > 1 {
                try_join_all(
                    next.iter()
                        .map(|(nested, group)| self.load(group.model.as_deref(), &group.rows, nested)),
                )
                .await?;
            } else {
                for (nested, group) in &next {
                    self.load(group.model.as_deref(), &group.rows, nested).await?;
                }
            }

            Ok(())
        })
    }

    /// The planner for a node, exposed for inspection and tests.
    pub fn planner_for(
        &self,
        model: Option<&str>,
        load: &super::include::EagerLoad,
    ) -> QueryResult<Box<dyn AssociationPlanner>> {
        planner::for_node(self.schema, model, load)
    }
}
