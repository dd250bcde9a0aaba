//! Batched eager loading of associations.
//!
//! This module provides:
//! - [`EagerLoad`] / [`EagerLoads`] for describing what to load
//! - One [`AssociationPlanner`] per association kind
//! - The [`merge`] engine that matches child rows to parents
//! - The [`EagerLoader`] orchestrator
//!
//! ## Example
//!
//! ```rust,ignore
//! let widgets = RawQuery::new("SELECT * FROM widgets WHERE active = %{on}")
//!     .bind("on", true)
//!     .model("Widget")
//!     .eager_load("category")
//!     .eager_load_with(
//!         EagerLoad::new("parts")
//!             .order_by(OrderByField::asc("position"))
//!             .eager_load("supplier"),
//!     )
//!     .run(&session)
//!     .await?;
//! ```
//!
//! Per association node, one lookup is issued for the whole parent batch
//! (two for many-to-many, one per hop for through associations), no matter
//! how many parents there are.

mod include;
mod loader;
pub mod merge;
pub mod planner;

pub use include::{AdHocSpec, EagerLoad, EagerLoadBuilder, EagerLoads};
pub use loader::EagerLoader;
pub use merge::MergeStats;
pub use planner::{AssociationPlanner, ChildGroup, Loaded};
