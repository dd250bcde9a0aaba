//! # leanrow-query
//!
//! Row materialization and batched eager loading for leanrow.
//!
//! This crate provides:
//! - Lightweight, dynamically shaped rows ([`RowRecord`]) with association slots
//! - Raw SQL queries with named binds ([`RawQuery`])
//! - Model queries built from schema metadata ([`ModelQuery`])
//! - Eager loading of association trees with one lookup per node ([`eager`])
//! - A pluggable data-access boundary ([`QueryRunner`])
//!
//! ## Rows
//!
//! Every row of one execution shares a [`RowShape`]: the column names, their
//! declared types and the association slots rows of that shape can hold.
//!
//! ```rust
//! use std::sync::Arc;
//! use leanrow_query::{ColumnType, RowShape, Value};
//!
//! let shape = Arc::new(RowShape::new(
//!     vec!["id".into(), "name".into()],
//!     vec![ColumnType::Int, ColumnType::Text],
//!     vec!["parts".into()],
//! ));
//! let row = shape.row(vec![Value::Int(1), Value::from("gear")]).unwrap();
//!
//! assert_eq!(row.get_i64("id"), Some(1));
//! assert_eq!(row.get_str("name"), Some("gear"));
//! assert!(!row.is_loaded("parts"));
//! ```
//!
//! ## Schema metadata
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
//! assert_eq!(schema.table_name("Part").unwrap(), "parts");
//! assert!(schema.resolve_association("Widget", "colour").is_err());
//! ```
//!
//! ## Eager loading
//!
//! ```rust
//! use leanrow_query::{EagerLoad, EagerLoadBuilder, OrderByField, RawQuery};
//!
//! let query = RawQuery::new("SELECT * FROM widgets WHERE active = %{on}")
//!     .bind("on", true)
//!     .model("Widget")
//!     .eager_load("category")
//!     .eager_load_with(
//!         EagerLoad::new("parts")
//!             .order_by(OrderByField::asc("position"))
//!             .eager_load("supplier"),
//!     );
//!
//! assert_eq!(query.eager_loads().slot_names(), vec!["category", "parts"]);
//! ```

pub mod config;
pub mod eager;
pub mod error;
pub mod logging;
pub mod query;
pub mod raw;
pub mod row;
pub mod runner;
pub mod schema;
pub mod session;
pub mod sql;
pub mod testing;
pub mod value;

pub use config::LoaderConfig;
pub use eager::{
    AdHocSpec, AssociationPlanner, ChildGroup, EagerLoad, EagerLoadBuilder, EagerLoader,
    EagerLoads, Loaded, MergeStats,
};
pub use error::{ErrorCode, ErrorContext, QueryError, QueryResult};
pub use query::ModelQuery;
pub use raw::RawQuery;
pub use row::{
    AssociationResult, Cardinality, ColumnType, DefaultRowFactory, RowFactory, RowRecord, RowRef,
    RowShape,
};
pub use runner::{BoxFuture, QueryLog, QueryRunner, TabularResult};
pub use schema::{
    AssociationKind, AssociationRef, ConditionGroup, JoinTable, ModelSpec, OrderByField,
    SchemaMetadata, SchemaRegistry, Scope, SortOrder,
};
pub use session::{Rows, Session};
pub use sql::{DatabaseType, SqlBuilder};
pub use value::Value;

// Re-export logging utilities
pub use logging::{
    get_log_format, get_log_level, init as init_logging, init_debug, init_with_level,
    is_debug_enabled,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::LoaderConfig;
    pub use crate::eager::{AdHocSpec, EagerLoad, EagerLoadBuilder, EagerLoads};
    pub use crate::error::{QueryError, QueryResult};
    pub use crate::query::ModelQuery;
    pub use crate::raw::RawQuery;
    pub use crate::row::{AssociationResult, Cardinality, RowRecord, RowRef};
    pub use crate::runner::{QueryLog, QueryRunner, TabularResult};
    pub use crate::schema::{AssociationRef, ModelSpec, OrderByField, SchemaMetadata, SchemaRegistry, Scope};
    pub use crate::session::Session;
    pub use crate::sql::DatabaseType;
    pub use crate::value::Value;
}
