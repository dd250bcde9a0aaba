//! SQLite query runner for leanrow.
//!
//! Runs leanrow's statements on SQLite through `tokio-rusqlite`, with a small
//! connection pool so concurrent sibling lookups each get their own
//! connection.
//!
//! # Example
//!
//! ```rust,ignore
//! use leanrow_query::{EagerLoadBuilder, RawQuery, Session};
//! use leanrow_sqlite::SqliteRunner;
//!
//! let runner = SqliteRunner::connect("sqlite://./shop.db").await?;
//! let session = Session::new(runner).with_schema(schema);
//!
//! let widgets = RawQuery::new("SELECT * FROM widgets")
//!     .model("Widget")
//!     .eager_load("parts")
//!     .run(&session)
//!     .await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod pool;
pub mod runner;
pub mod types;

pub use config::{DatabasePath, JournalMode, SqliteConfig, SynchronousMode};
pub use connection::SqliteConnection;
pub use error::{SqliteError, SqliteResult};
pub use pool::{PoolConfig, PoolStats, SqlitePool, SqlitePoolBuilder};
pub use runner::SqliteRunner;
