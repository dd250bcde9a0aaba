//! Model and association metadata.
//!
//! The eager loader never guesses key columns. Everything it needs to build
//! a lookup comes from a [`SchemaMetadata`] implementation: table names,
//! primary keys and declared associations. [`SchemaRegistry`] is the
//! in-memory implementation most callers use.
//!
//! ```rust
//! use leanrow_query::{AssociationRef, ModelSpec, SchemaMetadata, SchemaRegistry};
//!
//! let schema = SchemaRegistry::new()
//!     .model(
//!         ModelSpec::new("Widget", "widgets")
//!             .primary_key("id")
//!             .association(AssociationRef::belongs_to("category", "Category").foreign_key("cat_id"))
//!             .association(AssociationRef::has_many("parts", "Part").foreign_key("widget_id")),
//!     )
//!     .model(ModelSpec::new("Category", "categories").primary_key("id"))
//!     .model(ModelSpec::new("Part", "parts").primary_key("id"));
//!
//! assert_eq!(schema.table_name("Widget").unwrap(), "widgets");
//! assert!(schema.resolve_association("Widget", "category").is_ok());
//! assert!(schema.resolve_association("Widget", "owner").unwrap_err().is_unknown_association());
//! ```

use std::borrow::Cow;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};
use crate::row::Cardinality;
use crate::sql::SqlBuilder;
use crate::value::Value;

/// Sort order for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// Ascending order (A-Z, 0-9, oldest first).
    #[default]
    Asc,
    /// Descending order (Z-A, 9-0, newest first).
    Desc,
}

impl SortOrder {
    /// Get the SQL keyword for this sort order.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderByField {
    /// The column name to order by.
    pub column: Cow<'static, str>,
    /// The sort order.
    pub order: SortOrder,
}

impl OrderByField {
    pub fn new(column: impl Into<Cow<'static, str>>, order: SortOrder) -> Self {
        Self {
            column: column.into(),
            order,
        }
    }

    pub fn asc(column: impl Into<Cow<'static, str>>) -> Self {
        Self::new(column, SortOrder::Asc)
    }

    pub fn desc(column: impl Into<Cow<'static, str>>) -> Self {
        Self::new(column, SortOrder::Desc)
    }
}

/// Conditions of a refined scope, rendered against that scope's own binds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionGroup {
    /// Condition fragments.
    pub conditions: Vec<String>,
    /// Values for the `%{name}` references in `conditions`.
    pub binds: IndexMap<String, Value>,
}

/// A restriction applied to an association's (or a model query's) target rows.
///
/// Conditions are SQL fragments that may reference `%{name}` binds; they are
/// joined with `AND`, each wrapped in parentheses. A condition only sees the
/// binds of the scope it was added to, so refining a scope never changes the
/// values its own conditions run with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    /// Re-selected columns. `None` selects every column.
    pub select: Option<Vec<String>>,
    /// Condition fragments added to this scope.
    pub conditions: Vec<String>,
    /// Values for the `%{name}` references in `conditions`.
    pub binds: IndexMap<String, Value>,
    pub order_by: Vec<OrderByField>,
    /// Conditions of the scopes this one refines, rendered before `conditions`.
    pub inherited: Vec<ConditionGroup>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-select a subset of columns.
    pub fn select<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.select = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Add a condition fragment.
    pub fn filter(mut self, condition: impl Into<String>) -> Self {
        self.conditions.push(condition.into());
        self
    }

    /// Bind a value referenced by a condition as `%{name}`.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.binds.insert(name.into(), value.into());
        self
    }

    pub fn order_by(mut self, field: OrderByField) -> Self {
        self.order_by.push(field);
        self
    }

    /// Whether the scope neither re-selects, restricts nor orders.
    pub fn is_empty(&self) -> bool {
        self.select.is_none()
            && self.conditions.is_empty()
            && self.inherited.is_empty()
            && self.order_by.is_empty()
    }

    /// Combine a base scope with a per-request refinement.
    ///
    /// The refinement's `select` replaces the base one when present;
    /// conditions and ordering are appended after the base ones. Each side's
    /// conditions keep their own binds, so a name used on both sides binds
    /// two independent values.
    pub fn refine(&self, refinement: &Scope) -> Scope {
        let mut inherited = self.inherited.clone();
        if !self.conditions.is_empty() {
            inherited.push(ConditionGroup {
                conditions: self.conditions.clone(),
                binds: self.binds.clone(),
            });
        }
        inherited.extend(refinement.inherited.iter().cloned());

        Scope {
            select: refinement.select.clone().or_else(|| self.select.clone()),
            conditions: refinement.conditions.clone(),
            binds: refinement.binds.clone(),
            order_by: self
                .order_by
                .iter()
                .chain(&refinement.order_by)
                .cloned()
                .collect(),
            inherited,
        }
    }

    /// Every condition in render order, paired with the binds it sees.
    fn condition_groups(&self) -> impl Iterator<Item = (&str, &IndexMap<String, Value>)> {
        self.inherited
            .iter()
            .flat_map(|group| group.conditions.iter().map(move |c| (c.as_str(), &group.binds)))
            .chain(self.conditions.iter().map(|c| (c.as_str(), &self.binds)))
    }

    /// Render the select list, adding `required` columns a re-selection omits.
    pub(crate) fn push_select(&self, builder: &mut SqlBuilder, required: &[&str]) {
        match &self.select {
            None => {
                builder.push("*");
            }
            Some(columns) => {
                let mut all: Vec<&str> = columns.iter().map(String::as_str).collect();
                for &column in required {
                    if !all.contains(&column) {
                        all.push(column);
                    }
                }
                builder.push_identifiers(&all);
            }
        }
    }

    /// Render ` AND (cond)` for every condition.
    pub(crate) fn push_conditions(&self, builder: &mut SqlBuilder) -> QueryResult<()> {
        for (condition, binds) in self.condition_groups() {
            builder.push(" AND (");
            builder.push_template(condition, binds)?;
            builder.push(")");
        }
        Ok(())
    }

    /// Render ` WHERE (c1) AND (c2)` when there are conditions.
    pub(crate) fn push_where(&self, builder: &mut SqlBuilder) -> QueryResult<()> {
        for (i, (condition, binds)) in self.condition_groups().enumerate() {
            builder.push(if i == 0 { " WHERE (" } else { " AND (" });
            builder.push_template(condition, binds)?;
            builder.push(")");
        }
        Ok(())
    }

    /// Render ` ORDER BY ...` when ordering is set.
    pub(crate) fn push_order_by(&self, builder: &mut SqlBuilder) {
        for (i, field) in self.order_by.iter().enumerate() {
            builder.push(if i == 0 { " ORDER BY " } else { ", " });
            builder.push_identifier(&field.column);
            builder.push(" ").push(field.order.as_sql());
        }
    }
}

/// The shape of an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssociationKind {
    /// Forward reference: the owner holds the foreign key.
    BelongsTo,
    /// The target holds a foreign key to the owner; at most one target.
    HasOne,
    /// The target holds a foreign key to the owner.
    HasMany,
    /// Many-to-many through a join table.
    HasAndBelongsToMany,
    /// Composition of two associations.
    Through,
    /// Belongs-to whose target model is named by a type column on the owner.
    PolymorphicBelongsTo,
}

impl AssociationKind {
    /// Cardinality of the kind. `None` for [`Through`](Self::Through), which
    /// depends on its hops.
    pub fn cardinality(&self) -> Option<Cardinality> {
        match self {
            Self::BelongsTo | Self::HasOne | Self::PolymorphicBelongsTo => {
                Some(Cardinality::Single)
            }
            Self::HasMany | Self::HasAndBelongsToMany => Some(Cardinality::Collection),
            Self::Through => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BelongsTo => "belongs_to",
            Self::HasOne => "has_one",
            Self::HasMany => "has_many",
            Self::HasAndBelongsToMany => "has_and_belongs_to_many",
            Self::Through => "through",
            Self::PolymorphicBelongsTo => "polymorphic_belongs_to",
        }
    }
}

impl fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Join table of a many-to-many association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTable {
    pub table: String,
    /// Column referencing the owner's primary key.
    pub owner_column: String,
    /// Column referencing the target's primary key.
    pub target_column: String,
}

impl JoinTable {
    pub fn new(
        table: impl Into<String>,
        owner_column: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            owner_column: owner_column.into(),
            target_column: target_column.into(),
        }
    }
}

/// A declared association.
///
/// `primary_key` names the key on the side that does not hold the foreign
/// key: the target for belongs-to and many-to-many, the owner for has-one
/// and has-many. When unset, the schema's primary key for that model is used.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationRef {
    pub name: String,
    pub kind: AssociationKind,
    /// Target model. `None` for polymorphic belongs-to.
    pub target_model: Option<String>,
    pub foreign_key: Option<String>,
    pub primary_key: Option<String>,
    pub join_table: Option<JoinTable>,
    /// For `Through`: the owner's association reaching the intermediate rows.
    pub through: Option<String>,
    /// For `Through`: the intermediate model's association reaching the targets.
    pub source: Option<String>,
    /// For polymorphic belongs-to: the owner column naming the target model.
    pub foreign_type: Option<String>,
    /// Base scope applied to every lookup of this association.
    pub scope: Scope,
}

impl AssociationRef {
    fn new(name: impl Into<String>, kind: AssociationKind, target_model: Option<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            target_model,
            foreign_key: None,
            primary_key: None,
            join_table: None,
            through: None,
            source: None,
            foreign_type: None,
            scope: Scope::default(),
        }
    }

    pub fn belongs_to(name: impl Into<String>, target_model: impl Into<String>) -> Self {
        Self::new(name, AssociationKind::BelongsTo, Some(target_model.into()))
    }

    pub fn has_one(name: impl Into<String>, target_model: impl Into<String>) -> Self {
        Self::new(name, AssociationKind::HasOne, Some(target_model.into()))
    }

    pub fn has_many(name: impl Into<String>, target_model: impl Into<String>) -> Self {
        Self::new(name, AssociationKind::HasMany, Some(target_model.into()))
    }

    pub fn has_and_belongs_to_many(
        name: impl Into<String>,
        target_model: impl Into<String>,
        join_table: JoinTable,
    ) -> Self {
        let mut assoc = Self::new(
            name,
            AssociationKind::HasAndBelongsToMany,
            Some(target_model.into()),
        );
        assoc.join_table = Some(join_table);
        assoc
    }

    /// An association reached through `through`, then `source` on the
    /// intermediate model.
    pub fn through(
        name: impl Into<String>,
        through: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        let mut assoc = Self::new(name, AssociationKind::Through, None);
        assoc.through = Some(through.into());
        assoc.source = Some(source.into());
        assoc
    }

    /// A belongs-to whose target model is read from `foreign_type`.
    pub fn polymorphic_belongs_to(
        name: impl Into<String>,
        foreign_key: impl Into<String>,
        foreign_type: impl Into<String>,
    ) -> Self {
        let mut assoc = Self::new(name, AssociationKind::PolymorphicBelongsTo, None);
        assoc.foreign_key = Some(foreign_key.into());
        assoc.foreign_type = Some(foreign_type.into());
        assoc
    }

    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// The target model, or a configuration error naming the association.
    pub fn require_target(&self) -> QueryResult<&str> {
        self.target_model.as_deref().ok_or_else(|| {
            QueryError::configuration(format!(
                "association '{}' declares no target model",
                self.name
            ))
            .with_association(&self.name)
        })
    }

    /// The foreign key column, or a configuration error naming the association.
    pub fn require_foreign_key(&self) -> QueryResult<&str> {
        self.foreign_key.as_deref().ok_or_else(|| {
            QueryError::configuration(format!(
                "association '{}' declares no foreign key",
                self.name
            ))
            .with_association(&self.name)
        })
    }
}

/// Model metadata lookup.
pub trait SchemaMetadata: Send + Sync {
    /// Table the model reads from. Configuration error if the model is unknown.
    fn table_name(&self, model: &str) -> QueryResult<String>;

    /// Primary key column. Configuration error if the model is unknown or
    /// declares none.
    fn primary_key(&self, model: &str) -> QueryResult<String>;

    /// Resolve a declared association.
    ///
    /// Unknown model: configuration error. Unknown name: unknown-association error.
    fn resolve_association(&self, model: &str, name: &str) -> QueryResult<AssociationRef>;
}

/// Metadata for one model.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub name: String,
    pub table: String,
    pub primary_key: Option<String>,
    pub associations: IndexMap<String, AssociationRef>,
}

impl ModelSpec {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            primary_key: None,
            associations: IndexMap::new(),
        }
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }

    /// Declare an association. A later declaration with the same name replaces
    /// the earlier one.
    pub fn association(mut self, association: AssociationRef) -> Self {
        self.associations
            .insert(association.name.clone(), association);
        self
    }
}

/// In-memory [`SchemaMetadata`].
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model, builder style.
    pub fn model(mut self, spec: ModelSpec) -> Self {
        self.register(spec);
        self
    }

    pub fn register(&mut self, spec: ModelSpec) {
        self.models.insert(spec.name.clone(), spec);
    }

    pub fn get(&self, model: &str) -> Option<&ModelSpec> {
        self.models.get(model)
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    fn require(&self, model: &str) -> QueryResult<&ModelSpec> {
        self.models.get(model).ok_or_else(|| {
            QueryError::configuration(format!("unknown model '{}'", model)).with_model(model)
        })
    }
}

impl SchemaMetadata for SchemaRegistry {
    fn table_name(&self, model: &str) -> QueryResult<String> {
        Ok(self.require(model)?.table.clone())
    }

    fn primary_key(&self, model: &str) -> QueryResult<String> {
        self.require(model)?.primary_key.clone().ok_or_else(|| {
            QueryError::configuration(format!("model '{}' declares no primary key", model))
                .with_model(model)
        })
    }

    fn resolve_association(&self, model: &str, name: &str) -> QueryResult<AssociationRef> {
        self.require(model)?
            .associations
            .get(name)
            .cloned()
            .ok_or_else(|| QueryError::unknown_association(model, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new()
            .model(
                ModelSpec::new("Post", "posts")
                    .primary_key("id")
                    .association(AssociationRef::belongs_to("author", "User").foreign_key("author_id"))
                    .association(
                        AssociationRef::has_and_belongs_to_many(
                            "tags",
                            "Tag",
                            JoinTable::new("post_tags", "post_id", "tag_id"),
                        ),
                    ),
            )
            .model(ModelSpec::new("User", "users"))
    }

    #[test]
    fn test_kind_cardinality() {
        assert_eq!(AssociationKind::BelongsTo.cardinality(), Some(Cardinality::Single));
        assert_eq!(AssociationKind::HasOne.cardinality(), Some(Cardinality::Single));
        assert_eq!(AssociationKind::HasMany.cardinality(), Some(Cardinality::Collection));
        assert_eq!(
            AssociationKind::HasAndBelongsToMany.cardinality(),
            Some(Cardinality::Collection)
        );
        assert_eq!(AssociationKind::Through.cardinality(), None);
    }

    #[test]
    fn test_registry_lookups() {
        let schema = registry();
        assert_eq!(schema.table_name("Post").unwrap(), "posts");
        assert_eq!(schema.primary_key("Post").unwrap(), "id");

        let author = schema.resolve_association("Post", "author").unwrap();
        assert_eq!(author.kind, AssociationKind::BelongsTo);
        assert_eq!(author.foreign_key.as_deref(), Some("author_id"));

        let tags = schema.resolve_association("Post", "tags").unwrap();
        assert_eq!(tags.join_table.map(|j| j.table), Some("post_tags".to_string()));
    }

    #[test]
    fn test_registry_errors() {
        let schema = registry();
        assert!(schema.table_name("Nope").unwrap_err().is_configuration_error());
        assert!(schema.primary_key("User").unwrap_err().is_configuration_error());
        assert!(
            schema
                .resolve_association("Nope", "author")
                .unwrap_err()
                .is_configuration_error()
        );
        assert!(
            schema
                .resolve_association("Post", "editor")
                .unwrap_err()
                .is_unknown_association()
        );
    }

    #[test]
    fn test_require_foreign_key() {
        let assoc = AssociationRef::has_many("comments", "Comment");
        assert!(assoc.require_foreign_key().unwrap_err().is_configuration_error());
        assert_eq!(
            assoc.foreign_key("post_id").require_foreign_key().unwrap(),
            "post_id"
        );
    }

    #[test]
    fn test_scope_refine() {
        let base = Scope::new()
            .filter("active = %{on}")
            .bind("on", true)
            .order_by(OrderByField::asc("position"));
        let refinement = Scope::new()
            .select(["id", "name"])
            .filter("kind = %{kind}")
            .bind("kind", "gear")
            .order_by(OrderByField::desc("id"));

        let merged = base.refine(&refinement);
        assert_eq!(merged.select, Some(vec!["id".to_string(), "name".to_string()]));
        assert_eq!(merged.inherited.len(), 1);
        assert_eq!(merged.inherited[0].conditions, vec!["active = %{on}"]);
        assert_eq!(merged.conditions, vec!["kind = %{kind}"]);
        assert_eq!(merged.binds.len(), 1);
        assert_eq!(
            merged.order_by,
            vec![OrderByField::asc("position"), OrderByField::desc("id")]
        );
    }

    #[test]
    fn test_scope_rendering() {
        let scope = Scope::new()
            .select(["name"])
            .filter("active = %{on}")
            .bind("on", true)
            .order_by(OrderByField::desc("id"));

        let mut b = SqlBuilder::sqlite();
        b.push("SELECT ");
        scope.push_select(&mut b, &["id"]);
        b.push(" FROM t");
        scope.push_where(&mut b).unwrap();
        scope.push_order_by(&mut b);

        let (sql, params) = b.build();
        assert_eq!(
            sql,
            "SELECT \"name\", \"id\" FROM t WHERE (active = ?) ORDER BY \"id\" DESC"
        );
        assert_eq!(params, vec![Value::Bool(true)]);
    }

    #[test]
    fn test_scope_refine_keeps_binds_apart() {
        let base = Scope::new().filter("active = %{flag}").bind("flag", true);
        let refinement = Scope::new().filter("archived = %{flag}").bind("flag", false);
        let merged = base
            .refine(&refinement)
            .refine(&Scope::new().filter("kind = %{flag}").bind("flag", "gear"));

        let mut b = SqlBuilder::sqlite();
        b.push("SELECT * FROM t");
        merged.push_where(&mut b).unwrap();

        let (sql, params) = b.build();
        assert_eq!(
            sql,
            "SELECT * FROM t WHERE (active = ?) AND (archived = ?) AND (kind = ?)"
        );
        assert_eq!(params, vec![Value::Bool(true), Value::Bool(false), Value::from("gear")]);
    }

    #[test]
    fn test_refined_condition_cannot_see_base_binds() {
        let base = Scope::new().filter("active = %{on}").bind("on", true);
        let merged = base.refine(&Scope::new().filter("visible = %{on}"));

        let mut b = SqlBuilder::sqlite();
        let err = merged.push_conditions(&mut b).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::MissingBind);
    }
}
