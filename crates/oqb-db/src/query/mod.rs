//! Query compilation.
//!
//! A find request flows through these modules in order:
//!
//! 1. [`include`] normalizes the include shorthand into an [`IncludeMap`](include::IncludeMap).
//! 2. [`where_clause`] parses predicates and reports the relation paths they touch.
//! 3. [`join_tree`] resolves associations into a tree of join nodes plus the
//!    [`ShapeDescriptor`](join_tree::ShapeDescriptor) used for hydration.
//! 4. [`renderer`] turns the tree into row and count [`SelectStatement`](compiler::SelectStatement)s.
//! 5. [`compiler`] renders statements into parameterized SQL.

pub mod compiler;
pub mod include;
pub mod join_tree;
pub mod options;
pub mod renderer;
pub mod where_clause;

/// Joins association names into table aliases: `customer->orders`.
pub const ALIAS_SEPARATOR: &str = "->";

/// Marks the join-table node of a many-to-many association:
/// `customer->through+friends`.
pub const THROUGH_PREFIX: &str = "through+";
