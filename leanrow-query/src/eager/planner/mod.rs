//! Association planners: one per association kind.
//!
//! A planner is resolved from metadata before any statement runs, so key
//! columns that cannot be determined fail early. At load time it collects
//! the parents' keys, issues the lookup and computes one
//! [`AssociationResult`] per parent. Attaching the results and recursing
//! into nested loads is the [`EagerLoader`]'s job.

mod ad_hoc;
mod belongs_to;
mod habtm;
mod has_many;
mod has_one;
mod polymorphic;
mod through;

pub use ad_hoc::AdHoc;
pub use belongs_to::BelongsTo;
pub use habtm::HasAndBelongsToMany;
pub use has_many::HasMany;
pub use has_one::HasOne;
pub use polymorphic::PolymorphicBelongsTo;
pub use through::Through;

use tracing::{debug, trace};

use crate::eager::include::EagerLoad;
use crate::eager::loader::EagerLoader;
use crate::eager::merge::{self, MergeStats};
use crate::error::{QueryError, QueryResult};
use crate::row::{AssociationResult, Cardinality, RowRef};
use crate::runner::BoxFuture;
use crate::schema::{AssociationKind, AssociationRef, SchemaMetadata, Scope};
use crate::sql::{DatabaseType, SqlBuilder};
use crate::value::Value;

/// Rows fetched for one node, grouped by the model they belong to.
#[derive(Debug, Clone)]
pub struct ChildGroup {
    /// Model of the rows; nested loads resolve against it.
    pub model: Option<String>,
    /// The rows, in database order.
    pub rows: Vec<RowRef>,
}

/// Outcome of loading one association node.
#[derive(Debug, Clone)]
pub struct Loaded {
    /// One result per parent, aligned with the parent batch.
    pub results: Vec<AssociationResult>,
    /// Fetched target rows; the parents of the next level.
    pub groups: Vec<ChildGroup>,
    /// Counters from matching children to parents.
    pub stats: MergeStats,
}

impl Loaded {
    /// Every parent gets the empty result; nothing was fetched.
    pub fn empty(parents: usize, cardinality: Cardinality) -> Self {
        Self {
            results: (0..parents).map(|_| cardinality.empty()).collect(),
            groups: Vec::new(),
            stats: MergeStats {
                parents,
                ..MergeStats::default()
            },
        }
    }

    fn single_group(
        results: Vec<AssociationResult>,
        model: Option<String>,
        rows: Vec<RowRef>,
        stats: MergeStats,
    ) -> Self {
        Self {
            results,
            groups: vec![ChildGroup { model, rows }],
            stats,
        }
    }
}

/// Loads one association for a batch of parents.
pub trait AssociationPlanner: Send + Sync {
    fn kind(&self) -> AssociationKind;

    fn cardinality(&self) -> Cardinality;

    /// Model of the loaded rows, when it is known before loading.
    fn target_model(&self) -> Option<&str>;

    /// Fetch and match the association for `parents`.
    fn load<'a>(
        &'a self,
        loader: &'a EagerLoader<'_>,
        parents: &'a [RowRef],
    ) -> BoxFuture<'a, QueryResult<Loaded>>;
}

/// Resolve the planner for one eager-load node on `model`.
pub(crate) fn for_node(
    schema: Option<&dyn SchemaMetadata>,
    model: Option<&str>,
    load: &EagerLoad,
) -> QueryResult<Box<dyn AssociationPlanner>> {
    let slots = load.nested.slot_names();

    if let Some(spec) = &load.ad_hoc {
        return Ok(Box::new(AdHoc::resolve(load.slot_name(), spec.clone(), slots)?));
    }

    let model = model.ok_or_else(|| {
        QueryError::configuration(format!(
            "eager loading '{}' requires a model; call .model(..) on the query",
            load.name
        ))
        .with_association(&load.name)
    })?;
    let schema = schema.ok_or_else(|| {
        QueryError::configuration(format!(
            "eager loading '{}' requires schema metadata on the session",
            load.name
        ))
        .with_model(model)
        .with_association(&load.name)
    })?;

    let association = schema.resolve_association(model, &load.name)?;
    for_association(schema, model, &association, &load.scope, slots)
}

/// Resolve the planner for a declared association of `owner`.
pub(crate) fn for_association(
    schema: &dyn SchemaMetadata,
    owner: &str,
    association: &AssociationRef,
    refinement: &Scope,
    slots: Vec<String>,
) -> QueryResult<Box<dyn AssociationPlanner>> {
    let scope = association.scope.refine(refinement);
    let planner: Box<dyn AssociationPlanner> = match association.kind {
        AssociationKind::BelongsTo => {
            Box::new(BelongsTo::resolve(schema, owner, association, scope, slots)?)
        }
        AssociationKind::HasOne => {
            Box::new(HasOne::resolve(schema, owner, association, scope, slots)?)
        }
        AssociationKind::HasMany => {
            Box::new(HasMany::resolve(schema, owner, association, scope, slots)?)
        }
        AssociationKind::HasAndBelongsToMany => Box::new(HasAndBelongsToMany::resolve(
            schema,
            owner,
            association,
            scope,
            slots,
        )?),
        AssociationKind::Through => {
            Box::new(Through::resolve(schema, owner, association, refinement, slots)?)
        }
        AssociationKind::PolymorphicBelongsTo => {
            Box::new(PolymorphicBelongsTo::resolve(association, scope, slots)?)
        }
    };
    Ok(planner)
}

/// `SELECT .. FROM table WHERE key IN (..)` plus scope, shared by the direct kinds.
#[derive(Debug, Clone)]
pub(crate) struct KeyedLookup {
    pub association: String,
    pub table: String,
    /// Column of the target table the parent keys are matched against.
    pub key_column: String,
    pub scope: Scope,
    /// Association slots of the fetched rows.
    pub slots: Vec<String>,
}

impl KeyedLookup {
    /// Build the lookup statement.
    pub fn statement(&self, db_type: DatabaseType, keys: &[Value]) -> QueryResult<(String, Vec<Value>)> {
        let mut builder = SqlBuilder::new(db_type);
        builder.push("SELECT ");
        self.scope.push_select(&mut builder, &[self.key_column.as_str()]);
        builder
            .push(" FROM ")
            .push_identifier(&self.table)
            .push(" WHERE ")
            .push_identifier(&self.key_column)
            .push(" IN (")
            .push_list(keys.iter().cloned())
            .push(")");
        self.scope.push_conditions(&mut builder)?;
        self.scope.push_order_by(&mut builder);
        Ok(builder.build())
    }

    /// Fetch the target rows for `keys`. No statement runs for an empty key set.
    pub async fn fetch(&self, loader: &EagerLoader<'_>, keys: &[Value]) -> QueryResult<Vec<RowRef>> {
        if keys.is_empty() {
            trace!(association = %self.association, reason = "no keys", "Skipping lookup");
            return Ok(Vec::new());
        }
        let (sql, params) = self.statement(loader.database_type(), keys)?;
        loader.fetch_rows(&sql, &params, &self.slots).await
    }
}

/// Shared load path of belongs-to, has-one and has-many: collect
/// `parent_key`, look up targets by `lookup.key_column`, match.
pub(crate) async fn load_keyed(
    loader: &EagerLoader<'_>,
    kind: AssociationKind,
    lookup: &KeyedLookup,
    parents: &[RowRef],
    parent_key: &str,
    cardinality: Cardinality,
    target_model: &str,
) -> QueryResult<Loaded> {
    let keys = merge::collect_keys(parents, parent_key)?;
    debug!(
        association = %lookup.association,
        kind = %kind,
        keys = keys.len(),
        "Planning association lookup"
    );
    if keys.is_empty() {
        trace!(association = %lookup.association, reason = "all keys null", "Skipping lookup");
        return Ok(Loaded::empty(parents.len(), cardinality));
    }

    let children = lookup.fetch(loader, &keys).await?;
    let (results, stats) =
        merge::associate(parents, &children, parent_key, &lookup.key_column, cardinality)?;
    Ok(Loaded::single_group(
        results,
        Some(target_model.to_string()),
        children,
        stats,
    ))
}

/// Primary key override from the association, else the schema's.
pub(crate) fn primary_key_for(
    schema: &dyn SchemaMetadata,
    association: &AssociationRef,
    model: &str,
) -> QueryResult<String> {
    match &association.primary_key {
        Some(column) => Ok(column.clone()),
        None => schema.primary_key(model).map_err(|e| {
            e.with_association(&association.name)
        }),
    }
}
