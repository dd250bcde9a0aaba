//! # leanrow
//!
//! Read-only SQL queries materialized as lightweight rows, with batched
//! eager loading of associations.
//!
//! leanrow provides:
//! - Raw SQL and model queries that return immutable rows instead of full
//!   entities
//! - Eager loading of declared associations (belongs-to, has-one,
//!   has-many, many-to-many, through, polymorphic) with one lookup per
//!   association level, no matter how many parents were returned
//! - Ad-hoc associations from caller supplied SQL
//! - A SQLite runner (default `sqlite` feature)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use leanrow::prelude::*;
//! use leanrow::sqlite::SqliteRunner;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), leanrow::QueryError> {
//!     let schema = SchemaRegistry::new()
//!         .model(
//!             ModelSpec::new("Widget", "widgets")
//!                 .primary_key("id")
//!                 .association(AssociationRef::has_many("parts", "Part").foreign_key("widget_id")),
//!         )
//!         .model(ModelSpec::new("Part", "parts").primary_key("id"));
//!
//!     let runner = SqliteRunner::connect("sqlite://./shop.db").await?;
//!     let session = Session::new(runner).with_schema(schema);
//!
//!     let widgets = ModelQuery::new("Widget")
//!         .eager_load("parts")
//!         .run(&session)
//!         .await?;
//!
//!     for widget in &widgets {
//!         println!("{:?} has {} parts", widget.get_str("name"), widget.many("parts").len());
//!     }
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Query building, eager loading and row materialization.
pub mod query {
    pub use leanrow_query::*;
}

/// SQLite runner and connection pool.
#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub mod sqlite {
    pub use leanrow_sqlite::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use leanrow_query::prelude::*;

    #[cfg(feature = "sqlite")]
    pub use leanrow_sqlite::{SqliteConfig, SqlitePool, SqliteRunner};
}

// Re-export key types at the crate root
pub use leanrow_query::{
    EagerLoad, EagerLoadBuilder, ModelQuery, QueryError, QueryResult, RawQuery, RowRef,
    SchemaRegistry, Session, Value,
};
