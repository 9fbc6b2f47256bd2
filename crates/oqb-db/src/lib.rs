//! # oqb-db
//!
//! Entity registry, relational query compiler, and nested result hydrator.
//!
//! ## Architecture
//!
//! A find request travels through a fixed pipeline:
//!
//! 1. [`query::include::normalize`] expands the include shorthand.
//! 2. [`query::join_tree::JoinTree::build`] resolves associations against the
//!    [`registry::Registry`] into an aliased join tree plus an output shape.
//! 3. [`query::renderer::render`] chooses a flat or a paginated-subquery
//!    statement, and builds the matching count statement.
//! 4. [`query::compiler::SqlCompiler`] turns statement trees into
//!    parameterized SQL for the target dialect.
//! 5. [`hydrate::hydrate`] folds the flat result rows back into nested JSON.
//!
//! [`executor::Finder`] drives the pipeline against any
//! [`executor::DbExecutor`]; nothing before step 5 touches the database.
//!
//! ## Module Overview
//!
//! - [`value`] - The backend-agnostic [`Value`] enum and [`Record`]
//! - [`entity`] - Entity and column definitions
//! - [`association`] - Association kinds and key maps
//! - [`registry`] - The validated set of entities
//! - [`constraints`] - Table constraints checked on insert
//! - [`query`] - Where clauses, includes, join trees, rendering, and compilation
//! - [`hydrate`] - Row-to-object hydration
//! - [`executor`] - The executor trait and entity operations

#![allow(clippy::too_many_lines)]
#![allow(clippy::format_push_string)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::result_large_err)]
#![allow(clippy::match_same_arms)]

pub mod association;
pub mod constraints;
pub mod entity;
pub mod executor;
pub mod hydrate;
pub mod query;
pub mod registry;
pub mod value;

#[cfg(test)]
mod test_fixtures;

// Re-export the most commonly used types at the crate root.
pub use association::{Association, AssociationKind};
pub use constraints::{Check, TableConstraint};
pub use entity::{Column, ColumnType, Entity};
pub use executor::{
    DbExecutor, DeleteOptions, FindAll, Finder, InsertOptions, PrimaryKey, SelectPlan,
    UpdateOptions,
};
pub use hydrate::hydrate;
pub use query::compiler::{CompiledStatement, DatabaseBackendType, Row, SqlCompiler};
pub use query::include::{Include, IncludeOptions, ThroughOptions};
pub use query::options::{Order, SelectOptions, SortDirection};
pub use query::renderer::{render, RenderedQuery, Strategy};
pub use query::where_clause::{ColumnRef, Where};
pub use registry::{Registry, RegistryBuilder};
pub use value::{Record, Value};
