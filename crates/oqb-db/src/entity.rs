//! Entity and column metadata.
//!
//! An [`Entity`] describes one table: its ordered columns, its primary key
//! (possibly composite), an optional soft-delete marker column, table
//! constraints, and the named associations attached by the
//! [`RegistryBuilder`](crate::registry::RegistryBuilder). Entities are
//! immutable once the registry is built.
//!
//! # Examples
//!
//! ```
//! use oqb_db::entity::{Column, ColumnType, Entity};
//!
//! let company = Entity::new("company")
//!     .column(Column::new("id").of_type(ColumnType::Integer).primary())
//!     .column(Column::new("name"))
//!     .column(Column::new("customer_id").of_type(ColumnType::Integer))
//!     .soft_deletes();
//!
//! assert_eq!(company.primary_key_names(), vec!["id"]);
//! assert_eq!(company.soft_delete_column(), Some("deleted_at"));
//! ```

use oqb_core::{OqbError, OqbResult};

use crate::association::Association;
use crate::constraints::TableConstraint;
use crate::value::Value;

/// Declared scalar type of a column, used to coerce raw result cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    String,
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    Time,
    Json,
    Uuid,
    Binary,
}

/// A single column of an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// The column name.
    pub name: String,
    /// The declared type. Untyped columns are strings.
    pub column_type: ColumnType,
    /// Whether the column is part of the primary key.
    pub primary: bool,
    /// Value substituted for NULL during hydration.
    pub default: Option<Value>,
    /// Whether hydration collects this column into a list across rows.
    pub array: bool,
}

impl Column {
    /// Creates a string column.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::default(),
            primary: false,
            default: None,
            array: false,
        }
    }

    /// Sets the column type.
    #[must_use]
    pub const fn of_type(mut self, column_type: ColumnType) -> Self {
        self.column_type = column_type;
        self
    }

    /// Marks the column as part of the primary key.
    #[must_use]
    pub const fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Sets the value used in place of NULL during hydration.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Collects the column into a list across duplicate rows.
    #[must_use]
    pub const fn array(mut self) -> Self {
        self.array = true;
        self
    }
}

/// A registered table.
#[derive(Debug, Clone)]
pub struct Entity {
    name: String,
    columns: Vec<Column>,
    soft_delete_column: Option<String>,
    timestamps: bool,
    constraints: Vec<TableConstraint>,
    associations: Vec<Association>,
}

impl Entity {
    /// Creates an entity with no columns. The name is also the table name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            soft_delete_column: None,
            timestamps: false,
            constraints: Vec::new(),
            associations: Vec::new(),
        }
    }

    /// Adds a column. A column with the same name replaces the earlier one.
    #[must_use]
    pub fn column(mut self, column: Column) -> Self {
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        self
    }

    /// Adds `created_at` and `updated_at` columns filled on insert and update.
    #[must_use]
    pub fn timestamps(mut self) -> Self {
        self.timestamps = true;
        self.column(Column::new("created_at").of_type(ColumnType::DateTime))
            .column(Column::new("updated_at").of_type(ColumnType::DateTime))
    }

    /// Adds a `deleted_at` column and uses it as the soft-delete marker.
    #[must_use]
    pub fn soft_deletes(self) -> Self {
        self.column(Column::new("deleted_at").of_type(ColumnType::DateTime))
            .soft_delete_on("deleted_at")
    }

    /// Uses an existing column as the soft-delete marker.
    #[must_use]
    pub fn soft_delete_on(mut self, column: impl Into<String>) -> Self {
        self.soft_delete_column = Some(column.into());
        self
    }

    /// Adds a table constraint checked on insert.
    #[must_use]
    pub fn constraint(mut self, constraint: TableConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// The entity (and table) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All columns in declaration order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Looks up a column by name.
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Looks up a column by name, failing with `UnknownColumn`.
    pub fn require_column(&self, name: &str) -> OqbResult<&Column> {
        self.get_column(name).ok_or_else(|| OqbError::UnknownColumn {
            entity: self.name.clone(),
            column: name.to_string(),
        })
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Primary key columns in declaration order.
    pub fn primary_key(&self) -> Vec<&Column> {
        self.columns.iter().filter(|c| c.primary).collect()
    }

    pub fn primary_key_names(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Returns `true` when more than one column forms the primary key.
    pub fn has_composite_key(&self) -> bool {
        self.columns.iter().filter(|c| c.primary).count() > 1
    }

    /// The soft-delete marker column, if the entity soft deletes.
    pub fn soft_delete_column(&self) -> Option<&str> {
        self.soft_delete_column.as_deref()
    }

    pub const fn has_timestamps(&self) -> bool {
        self.timestamps
    }

    pub fn constraints(&self) -> &[TableConstraint] {
        &self.constraints
    }

    /// Looks up an association by name.
    pub fn association(&self, name: &str) -> Option<&Association> {
        self.associations.iter().find(|a| a.name == name)
    }

    /// Looks up an association by name, failing with `UnknownRelationship`.
    pub fn require_association(&self, name: &str) -> OqbResult<&Association> {
        self.association(name)
            .ok_or_else(|| OqbError::UnknownRelationship {
                entity: self.name.clone(),
                association: name.to_string(),
            })
    }

    pub fn associations(&self) -> &[Association] {
        &self.associations
    }

    pub(crate) fn push_association(&mut self, association: Association) {
        match self
            .associations
            .iter_mut()
            .find(|a| a.name == association.name)
        {
            Some(existing) => *existing = association,
            None => self.associations.push(association),
        }
    }

    /// Checks the definition: a primary key exists and the soft-delete
    /// marker names a real column.
    pub(crate) fn check_definition(&self) -> OqbResult<()> {
        if self.primary_key().is_empty() {
            return Err(OqbError::MissingPrimaryKey(self.name.clone()));
        }
        if let Some(marker) = &self.soft_delete_column {
            self.require_column(marker)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn friend() -> Entity {
        Entity::new("friend")
            .column(Column::new("first_customer_id").of_type(ColumnType::Integer).primary())
            .column(Column::new("second_customer_id").of_type(ColumnType::Integer).primary())
    }

    #[test]
    fn test_untyped_column_is_string() {
        let c = Column::new("name");
        assert_eq!(c.column_type, ColumnType::String);
        assert!(!c.primary);
    }

    #[test]
    fn test_composite_primary_key() {
        let e = friend();
        assert!(e.has_composite_key());
        assert_eq!(
            e.primary_key_names(),
            vec!["first_customer_id", "second_customer_id"]
        );
    }

    #[test]
    fn test_timestamps_add_columns() {
        let e = Entity::new("customer")
            .column(Column::new("id").primary())
            .timestamps();
        assert!(e.has_timestamps());
        assert_eq!(e.column_names(), vec!["id", "created_at", "updated_at"]);
        assert_eq!(
            e.get_column("created_at").unwrap().column_type,
            ColumnType::DateTime
        );
    }

    #[test]
    fn test_soft_deletes() {
        let e = Entity::new("company")
            .column(Column::new("id").primary())
            .soft_deletes();
        assert_eq!(e.soft_delete_column(), Some("deleted_at"));
        assert!(e.check_definition().is_ok());
    }

    #[test]
    fn test_duplicate_column_replaces() {
        let e = Entity::new("t")
            .column(Column::new("id").primary())
            .column(Column::new("id").of_type(ColumnType::Integer).primary());
        assert_eq!(e.columns().len(), 1);
        assert_eq!(e.columns()[0].column_type, ColumnType::Integer);
    }

    #[test]
    fn test_missing_primary_key() {
        let e = Entity::new("log").column(Column::new("message"));
        assert!(matches!(
            e.check_definition(),
            Err(OqbError::MissingPrimaryKey(name)) if name == "log"
        ));
    }

    #[test]
    fn test_soft_delete_marker_must_exist() {
        let e = Entity::new("t")
            .column(Column::new("id").primary())
            .soft_delete_on("removed_at");
        assert!(matches!(
            e.check_definition(),
            Err(OqbError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_require_association_unknown() {
        let e = friend();
        let err = e.require_association("nope").unwrap_err();
        assert!(matches!(err, OqbError::UnknownRelationship { .. }));
    }
}
