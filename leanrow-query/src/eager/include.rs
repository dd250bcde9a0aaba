//! Eager-load tree specifications.

use indexmap::IndexMap;

use crate::error::{QueryError, QueryResult};
use crate::row::Cardinality;
use crate::schema::{OrderByField, Scope};
use crate::value::Value;

/// A caller supplied lookup statement for an association the schema does
/// not declare.
///
/// The SQL must reference `%{ids}`; the collected parent keys are bound
/// there as a list. Children are matched by `parent_column == child_column`.
#[derive(Debug, Clone, PartialEq)]
pub struct AdHocSpec {
    pub sql: String,
    pub cardinality: Cardinality,
    pub parent_column: String,
    pub child_column: String,
    /// Extra binds referenced by the SQL.
    pub binds: IndexMap<String, Value>,
    /// Model of the child rows, for declared nested loads under this node.
    pub model: Option<String>,
}

impl AdHocSpec {
    pub fn new(
        sql: impl Into<String>,
        cardinality: Cardinality,
        parent_column: impl Into<String>,
        child_column: impl Into<String>,
    ) -> Self {
        Self {
            sql: sql.into(),
            cardinality,
            parent_column: parent_column.into(),
            child_column: child_column.into(),
            binds: IndexMap::new(),
            model: None,
        }
    }
}

/// One node of an eager-load tree.
#[derive(Debug, Clone, PartialEq)]
pub struct EagerLoad {
    /// Declared association name. For ad-hoc nodes, the slot name.
    pub name: String,
    /// Slot name when it differs from the association name.
    pub alias: Option<String>,
    /// Refinement applied on top of the association's own scope.
    pub scope: Scope,
    pub nested: EagerLoads,
    pub ad_hoc: Option<AdHocSpec>,
}

impl EagerLoad {
    /// Load a declared association.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            scope: Scope::default(),
            nested: EagerLoads::default(),
            ad_hoc: None,
        }
    }

    /// An ad-hoc single-row association.
    pub fn one(
        name: impl Into<String>,
        sql: impl Into<String>,
        parent_column: impl Into<String>,
        child_column: impl Into<String>,
    ) -> Self {
        Self::ad_hoc(name, AdHocSpec::new(sql, Cardinality::Single, parent_column, child_column))
    }

    /// An ad-hoc collection association.
    pub fn many(
        name: impl Into<String>,
        sql: impl Into<String>,
        parent_column: impl Into<String>,
        child_column: impl Into<String>,
    ) -> Self {
        Self::ad_hoc(
            name,
            AdHocSpec::new(sql, Cardinality::Collection, parent_column, child_column),
        )
    }

    pub fn ad_hoc(name: impl Into<String>, spec: AdHocSpec) -> Self {
        let mut load = Self::new(name);
        load.ad_hoc = Some(spec);
        load
    }

    /// Store the result under `alias` instead of the association name.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Re-select columns. Key columns needed for merging are always added.
    pub fn select<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.scope = self.scope.select(columns);
        self
    }

    pub fn filter(mut self, condition: impl Into<String>) -> Self {
        self.scope = self.scope.filter(condition);
        self
    }

    /// Bind a `%{name}` value for this node's conditions, or for its ad-hoc SQL.
    ///
    /// On ad-hoc nodes `ids` is reserved for the parent keys; binding it
    /// fails the load with a configuration error.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        match self.ad_hoc.as_mut() {
            Some(spec) => {
                spec.binds.insert(name.into(), value.into());
            }
            None => self.scope = self.scope.bind(name, value),
        }
        self
    }

    pub fn order_by(mut self, field: OrderByField) -> Self {
        self.scope = self.scope.order_by(field);
        self
    }

    /// Model of ad-hoc child rows. No effect on declared associations.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        if let Some(spec) = self.ad_hoc.as_mut() {
            spec.model = Some(model.into());
        }
        self
    }

    /// The name of the slot the result is stored under.
    pub fn slot_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Whether this node runs caller supplied SQL.
    pub fn is_ad_hoc(&self) -> bool {
        self.ad_hoc.is_some()
    }

    /// Whether this node has nested loads.
    pub fn has_nested(&self) -> bool {
        !self.nested.is_empty()
    }

    fn absorb(&mut self, other: EagerLoad) {
        if !other.scope.is_empty() {
            self.scope = self.scope.refine(&other.scope);
        }
        if other.ad_hoc.is_some() {
            self.ad_hoc = other.ad_hoc;
        }
        self.nested.merge(other.nested);
    }
}

impl EagerLoadBuilder for EagerLoad {
    fn eager_loads_mut(&mut self) -> &mut EagerLoads {
        &mut self.nested
    }
}

/// A set of sibling eager loads, keyed by slot name, in request order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EagerLoads {
    loads: IndexMap<String, EagerLoad>,
    /// Requests that named an occupied slot for something else.
    conflicts: Vec<String>,
}

impl EagerLoads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Requesting a slot twice merges the two requests: nested
    /// trees are unioned and scopes refined in order.
    ///
    /// A request for a slot already taken by a different association (or
    /// by an ad-hoc load when this one is declared) is not merged; it is
    /// reported by [`EagerLoads::check_conflicts`].
    pub fn add(&mut self, load: EagerLoad) {
        match self.loads.get_mut(load.slot_name()) {
            Some(existing)
                if existing.name != load.name || existing.is_ad_hoc() != load.is_ad_hoc() =>
            {
                self.conflicts.push(format!(
                    "slot '{}' is requested for both '{}' and '{}'",
                    load.slot_name(),
                    existing.name,
                    load.name
                ));
            }
            Some(existing) => existing.absorb(load),
            None => {
                self.loads.insert(load.slot_name().to_string(), load);
            }
        }
    }

    /// Add a dotted path such as `"parts.supplier"`. Empty segments are ignored.
    pub fn add_path(&mut self, path: &str) {
        let parts: Vec<&str> = path
            .split('.')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if let Some(load) = Self::build_path(&parts) {
            self.add(load);
        }
    }

    fn build_path(parts: &[&str]) -> Option<EagerLoad> {
        let (first, rest) = parts.split_first()?;
        let mut load = EagerLoad::new(*first);
        if let Some(child) = Self::build_path(rest) {
            load.nested.add(child);
        }
        Some(load)
    }

    /// Add every node of `other`, merging repeated slots.
    pub fn merge(&mut self, other: EagerLoads) {
        self.conflicts.extend(other.conflicts);
        for load in other.loads.into_values() {
            self.add(load);
        }
    }

    /// Fail with a configuration error if two requests at this level claimed
    /// the same slot for different associations.
    pub fn check_conflicts(&self) -> QueryResult<()> {
        match self.conflicts.first() {
            Some(conflict) => Err(QueryError::configuration(conflict.clone())
                .with_suggestion("Give one of the loads a distinct .alias(..)")),
            None => Ok(()),
        }
    }

    /// The node stored under `slot`.
    pub fn get(&self, slot: &str) -> Option<&EagerLoad> {
        self.loads.get(slot)
    }

    /// Nodes in request order.
    pub fn iter(&self) -> impl Iterator<Item = &EagerLoad> {
        self.loads.values()
    }

    /// Slot names in request order; these are the slots rows of this level
    /// are materialized with.
    pub fn slot_names(&self) -> Vec<String> {
        self.loads.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.loads.is_empty()
    }

    pub fn len(&self) -> usize {
        self.loads.len()
    }
}

impl From<EagerLoad> for EagerLoads {
    fn from(load: EagerLoad) -> Self {
        let mut loads = Self::new();
        loads.add(load);
        loads
    }
}

impl FromIterator<EagerLoad> for EagerLoads {
    fn from_iter<T: IntoIterator<Item = EagerLoad>>(iter: T) -> Self {
        let mut loads = Self::new();
        for load in iter {
            loads.add(load);
        }
        loads
    }
}

/// Fluent eager-load methods shared by queries and tree nodes.
pub trait EagerLoadBuilder: Sized {
    fn eager_loads_mut(&mut self) -> &mut EagerLoads;

    /// Eager load a declared association.
    fn eager_load(mut self, name: impl Into<String>) -> Self {
        self.eager_loads_mut().add(EagerLoad::new(name));
        self
    }

    /// Eager load a configured node (alias, scope, nested loads).
    fn eager_load_with(mut self, load: EagerLoad) -> Self {
        self.eager_loads_mut().add(load);
        self
    }

    /// Eager load a dotted path of associations, e.g. `"parts.supplier"`.
    fn eager_load_path(mut self, path: &str) -> Self {
        self.eager_loads_mut().add_path(path);
        self
    }

    /// Eager load one row per parent through caller supplied SQL with `%{ids}`.
    fn eager_load_one(
        self,
        name: impl Into<String>,
        sql: impl Into<String>,
        parent_column: impl Into<String>,
        child_column: impl Into<String>,
    ) -> Self {
        self.eager_load_with(EagerLoad::one(name, sql, parent_column, child_column))
    }

    /// Eager load many rows per parent through caller supplied SQL with `%{ids}`.
    fn eager_load_many(
        self,
        name: impl Into<String>,
        sql: impl Into<String>,
        parent_column: impl Into<String>,
        child_column: impl Into<String>,
    ) -> Self {
        self.eager_load_with(EagerLoad::many(name, sql, parent_column, child_column))
    }
}
