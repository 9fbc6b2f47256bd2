//! # oqb
//!
//! A relational query compiler and nested result hydrator.
//!
//! Register entities and their associations once, then ask for a root entity
//! with a tree of included associations. oqb compiles the request into one
//! row statement and one count statement, paginates root rows correctly even
//! when to-many associations are joined, and folds the flat result rows back
//! into nested JSON objects.
//!
//! This is the meta-crate that re-exports the sub-crates. Depend on
//! individual crates for finer-grained control.
//!
//! ```no_run
//! use oqb::prelude::*;
//!
//! # async fn demo() -> OqbResult<()> {
//! let mut builder = Registry::builder();
//! builder
//!     .define(
//!         Entity::new("customer")
//!             .column(Column::new("id").of_type(ColumnType::Integer).primary())
//!             .column(Column::new("name")),
//!     )?
//!     .define(
//!         Entity::new("order")
//!             .column(Column::new("id").of_type(ColumnType::Integer).primary())
//!             .column(Column::new("customer_id").of_type(ColumnType::Integer)),
//!     )?
//!     .has_many("customer", "orders", "order", "customer_id")?;
//! let registry = builder.build();
//!
//! let db = connect(&DatabaseConfig::sqlite_memory())?;
//! let page = registry
//!     .finder("customer")?
//!     .find_all(
//!         db.as_ref(),
//!         &SelectOptions::new()
//!             .include(IncludeOptions::new("orders").required())
//!             .order(Order::asc("name"))
//!             .limit(10),
//!     )
//!     .await?;
//! println!("{} of {} customers", page.rows.len(), page.count);
//! # Ok(())
//! # }
//! ```

/// Error types, settings, and logging setup.
pub use oqb_core as core;

/// Entity registry, query compiler, and hydrator.
pub use oqb_db as db;

/// Database backends: `SQLite` and `PostgreSQL`.
pub use oqb_db_backends as db_backends;

pub use serde_json;

/// The commonly used types in one import.
pub mod prelude {
    pub use oqb_core::{OqbError, OqbResult, Settings};
    pub use oqb_db::{
        Column, ColumnRef, ColumnType, DbExecutor, DeleteOptions, Entity, FindAll, Finder,
        Include, IncludeOptions, InsertOptions, Order, PrimaryKey, Record, Registry,
        SelectOptions, SortDirection, ThroughOptions, UpdateOptions, Value, Where,
    };
    pub use oqb_db_backends::{connect, DatabaseBackend, DatabaseConfig};
}
