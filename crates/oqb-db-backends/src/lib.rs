//! # oqb-db-backends
//!
//! Database backend implementations for oqb. Each backend implements both
//! [`DatabaseBackend`](base::DatabaseBackend) and
//! [`DbExecutor`](oqb_db::DbExecutor), so it can be handed straight to a
//! [`Finder`](oqb_db::Finder).
//!
//! Supported backends:
//! - `SQLite` (feature `sqlite`, on by default)
//! - `PostgreSQL` (feature `postgres`)

pub mod base;
#[cfg(feature = "postgres")]
pub mod postgresql;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use base::{connect, DatabaseBackend, DatabaseConfig};
#[cfg(feature = "postgres")]
pub use postgresql::PostgresBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;
