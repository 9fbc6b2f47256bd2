//! SQL statement AST and compiler.
//!
//! This module defines the [`SelectStatement`] AST produced by the query
//! renderer, and the [`SqlCompiler`] that translates it into parameterized
//! SQL. The compiler supports `PostgreSQL` (`$1, $2, ...`) and `SQLite` (`?`)
//! placeholder styles. All identifiers are double-quoted, so table aliases
//! such as `customer->orders` are valid as-is.

use oqb_core::{OqbError, OqbResult};

use crate::value::Value;

/// The type of database backend, used by the compiler to generate
/// backend-specific SQL syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackendType {
    /// `PostgreSQL` (uses `$1, $2, ...` placeholders).
    PostgreSQL,
    /// `SQLite` (uses `?` placeholders).
    SQLite,
}

impl DatabaseBackendType {
    /// SQL expression for the current timestamp.
    pub const fn now_sql(self) -> &'static str {
        match self {
            Self::PostgreSQL => "NOW()",
            Self::SQLite => "CURRENT_TIMESTAMP",
        }
    }
}

/// A column qualified by its table alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnExpr {
    pub table: String,
    pub column: String,
}

impl ColumnExpr {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }

    /// The `alias.column` key under which a selected column is returned.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.table, self.column)
    }
}

/// A column ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: ColumnExpr,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(column: ColumnExpr) -> Self {
        Self {
            column,
            descending: false,
        }
    }

    pub fn desc(column: ColumnExpr) -> Self {
        Self {
            column,
            descending: true,
        }
    }
}

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    NotEq,
    Like,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Like => "LIKE",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
        }
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(ColumnExpr),
    Value(Value),
    /// The backend's current timestamp.
    Now,
}

/// A boolean condition in WHERE or ON position.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Conjunction. Empty means true.
    And(Vec<Condition>),
    /// Disjunction. Empty means false.
    Or(Vec<Condition>),
    Compare {
        left: ColumnExpr,
        op: CompareOp,
        right: Operand,
    },
    IsNull {
        column: ColumnExpr,
        negated: bool,
    },
    /// Membership. An empty list is always false.
    In {
        column: ColumnExpr,
        values: Vec<Value>,
    },
    /// A correlated existence check.
    Exists(Box<SelectStatement>),
    /// `NOT EXISTS`.
    NotExists(Box<SelectStatement>),
}

impl Condition {
    /// `left = right` between two columns.
    pub fn columns_eq(left: ColumnExpr, right: ColumnExpr) -> Self {
        Self::Compare {
            left,
            op: CompareOp::Eq,
            right: Operand::Column(right),
        }
    }

    /// `(col IS NULL OR col > now)`: the row is not deleted yet.
    pub fn not_deleted(column: ColumnExpr) -> Self {
        Self::Or(vec![
            Self::IsNull {
                column: column.clone(),
                negated: false,
            },
            Self::Compare {
                left: column,
                op: CompareOp::Gt,
                right: Operand::Now,
            },
        ])
    }
}

/// One entry of the select list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectColumn {
    /// `"alias".*`
    AllFrom(String),
    /// `"table"."column" AS "alias"`
    Column { expr: ColumnExpr, alias: String },
    /// `COUNT(*) AS "alias"`
    CountStar(String),
    /// `1`, used inside EXISTS.
    One,
}

/// The FROM source.
#[derive(Debug, Clone, PartialEq)]
pub enum TableRef {
    /// `"name" AS "alias"`
    Table { name: String, alias: String },
    /// `(subquery) AS "alias"`
    Derived {
        query: Box<SelectStatement>,
        alias: String,
    },
}

/// SQL JOIN types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    /// INNER JOIN.
    Inner,
    /// LEFT JOIN.
    Left,
}

impl JoinType {
    /// Returns the SQL keyword for this join type.
    pub const fn sql_keyword(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
        }
    }
}

/// A JOIN clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: String,
    pub alias: String,
    pub join_type: JoinType,
    pub on: Condition,
}

/// The AST of a SELECT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub select: Vec<SelectColumn>,
    pub from: TableRef,
    pub joins: Vec<Join>,
    /// Conditions combined with AND.
    pub conditions: Vec<Condition>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectStatement {
    /// `SELECT * FROM "table" AS "alias"`.
    pub fn from_table(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::from_ref(TableRef::Table {
            name: table.into(),
            alias: alias.into(),
        })
    }

    /// `SELECT * FROM (query) AS "alias"`.
    pub fn from_derived(query: Self, alias: impl Into<String>) -> Self {
        Self::from_ref(TableRef::Derived {
            query: Box::new(query),
            alias: alias.into(),
        })
    }

    fn from_ref(from: TableRef) -> Self {
        Self {
            select: Vec::new(),
            from,
            joins: Vec::new(),
            conditions: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }
}

/// SQL text and its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// A generic database row for passing data between backends and the engine.
///
/// `Row` holds a list of column names and their corresponding values. It
/// provides typed access via the [`get`](Row::get) method.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row from column names and values.
    ///
    /// # Panics
    ///
    /// Panics if the number of columns does not match the number of values.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        assert_eq!(
            columns.len(),
            values.len(),
            "Row column count must match value count"
        );
        Self { columns, values }
    }

    /// Returns the column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the values in column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Gets a typed value by column name.
    pub fn get<T: FromValue>(&self, column: &str) -> OqbResult<T> {
        let idx = self
            .columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| OqbError::DatabaseError(format!("Column '{column}' not found in row")))?;
        T::from_value(&self.values[idx])
    }

    /// Gets a typed value by column index.
    pub fn get_by_index<T: FromValue>(&self, idx: usize) -> OqbResult<T> {
        let value = self.values.get(idx).ok_or_else(|| {
            OqbError::DatabaseError(format!(
                "Column index {idx} out of bounds (row has {} columns)",
                self.values.len()
            ))
        })?;
        T::from_value(value)
    }

    /// Returns a reference to the raw Value at the given column name.
    pub fn get_value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }
}

/// Trait for converting a [`Value`] to a concrete Rust type.
pub trait FromValue: Sized {
    /// Attempts to convert a value reference to this type.
    fn from_value(value: &Value) -> OqbResult<Self>;
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> OqbResult<Self> {
        match value {
            Value::Int(i) => Ok(*i),
            Value::String(s) => s
                .parse()
                .map_err(|e| OqbError::DatabaseError(format!("Expected Int, got '{s}': {e}"))),
            _ => Err(OqbError::DatabaseError(format!("Expected Int, got {value:?}"))),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> OqbResult<Self> {
        match value {
            Value::Float(f) => Ok(*f),
            #[allow(clippy::cast_precision_loss)]
            Value::Int(i) => Ok(*i as Self),
            _ => Err(OqbError::DatabaseError(format!("Expected Float, got {value:?}"))),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> OqbResult<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            _ => Err(OqbError::DatabaseError(format!("Expected Bool, got {value:?}"))),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> OqbResult<Self> {
        match value {
            Value::String(s) => Ok(s.clone()),
            _ => Err(OqbError::DatabaseError(format!("Expected String, got {value:?}"))),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> OqbResult<Self> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> OqbResult<Self> {
        match value {
            Value::Null => Ok(None),
            _ => T::from_value(value).map(Some),
        }
    }
}

/// Quotes an identifier, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn quote_column(column: &ColumnExpr) -> String {
    format!("{}.{}", quote_ident(&column.table), quote_ident(&column.column))
}

/// The SQL compiler translates a [`SelectStatement`] AST into parameterized SQL.
///
/// Different backends use different placeholder styles:
/// - `PostgreSQL`: `$1, $2, $3, ...`
/// - `SQLite`: `?, ?, ?, ...`
#[derive(Debug, Clone, Copy)]
pub struct SqlCompiler {
    backend: DatabaseBackendType,
}

impl SqlCompiler {
    /// Creates a new compiler for the given backend type.
    pub const fn new(backend: DatabaseBackendType) -> Self {
        Self { backend }
    }

    pub const fn backend(&self) -> DatabaseBackendType {
        self.backend
    }

    /// Returns a parameter placeholder for the given 1-based index.
    fn placeholder(&self, index: usize) -> String {
        match self.backend {
            DatabaseBackendType::PostgreSQL => format!("${index}"),
            DatabaseBackendType::SQLite => "?".to_string(),
        }
    }

    fn push_param(&self, value: &Value, params: &mut Vec<Value>) -> String {
        params.push(value.clone());
        self.placeholder(params.len())
    }

    /// Compiles a SELECT statement into SQL and parameters.
    pub fn compile_select(&self, statement: &SelectStatement) -> CompiledStatement {
        let mut sql = String::new();
        let mut params = Vec::new();
        self.write_select(statement, &mut sql, &mut params);
        CompiledStatement { sql, params }
    }

    /// Compiles a standalone condition, e.g. for logging a where clause.
    pub fn compile_condition(&self, condition: &Condition) -> CompiledStatement {
        let mut sql = String::new();
        let mut params = Vec::new();
        self.write_condition(condition, &mut sql, &mut params);
        CompiledStatement { sql, params }
    }

    /// Compiles an INSERT statement.
    pub fn compile_insert(&self, table: &str, fields: &[(String, Value)]) -> CompiledStatement {
        let mut params = Vec::new();
        let columns: Vec<String> = fields.iter().map(|(name, _)| quote_ident(name)).collect();
        let placeholders: Vec<String> = fields
            .iter()
            .map(|(_, val)| self.push_param(val, &mut params))
            .collect();

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            columns.join(", "),
            placeholders.join(", ")
        );

        CompiledStatement { sql, params }
    }

    /// Compiles an UPDATE statement. No conditions updates every row.
    pub fn compile_update(
        &self,
        table: &str,
        fields: &[(String, Value)],
        conditions: &[Condition],
    ) -> CompiledStatement {
        let mut params = Vec::new();
        let set_parts: Vec<String> = fields
            .iter()
            .map(|(name, val)| {
                let ph = self.push_param(val, &mut params);
                format!("{} = {ph}", quote_ident(name))
            })
            .collect();

        let mut sql = format!("UPDATE {} SET {}", quote_ident(table), set_parts.join(", "));
        self.write_where(conditions, &mut sql, &mut params);

        CompiledStatement { sql, params }
    }

    /// Compiles a DELETE statement. No conditions deletes every row.
    pub fn compile_delete(&self, table: &str, conditions: &[Condition]) -> CompiledStatement {
        let mut params = Vec::new();
        let mut sql = format!("DELETE FROM {}", quote_ident(table));
        self.write_where(conditions, &mut sql, &mut params);
        CompiledStatement { sql, params }
    }

    fn write_select(&self, statement: &SelectStatement, sql: &mut String, params: &mut Vec<Value>) {
        sql.push_str("SELECT ");

        let select_parts: Vec<String> = if statement.select.is_empty() {
            vec!["*".to_string()]
        } else {
            statement
                .select
                .iter()
                .map(|col| match col {
                    SelectColumn::AllFrom(alias) => format!("{}.*", quote_ident(alias)),
                    SelectColumn::Column { expr, alias } => {
                        format!("{} AS {}", quote_column(expr), quote_ident(alias))
                    }
                    SelectColumn::CountStar(alias) => format!("COUNT(*) AS {}", quote_ident(alias)),
                    SelectColumn::One => "1".to_string(),
                })
                .collect()
        };
        sql.push_str(&select_parts.join(", "));

        // FROM
        sql.push_str(" FROM ");
        match &statement.from {
            TableRef::Table { name, alias } => {
                sql.push_str(&format!("{} AS {}", quote_ident(name), quote_ident(alias)));
            }
            TableRef::Derived { query, alias } => {
                sql.push('(');
                self.write_select(query, sql, params);
                sql.push_str(&format!(") AS {}", quote_ident(alias)));
            }
        }

        // JOINs
        for join in &statement.joins {
            sql.push_str(&format!(
                " {} {} AS {} ON ",
                join.join_type.sql_keyword(),
                quote_ident(&join.table),
                quote_ident(&join.alias)
            ));
            self.write_condition(&join.on, sql, params);
        }

        self.write_where(&statement.conditions, sql, params);

        // ORDER BY
        if !statement.order_by.is_empty() {
            let orders: Vec<String> = statement
                .order_by
                .iter()
                .map(|o| {
                    let dir = if o.descending { "DESC" } else { "ASC" };
                    format!("{} {dir}", quote_column(&o.column))
                })
                .collect();
            sql.push_str(&format!(" ORDER BY {}", orders.join(", ")));
        }

        if let Some(limit) = statement.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        if let Some(offset) = statement.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
    }

    fn write_where(&self, conditions: &[Condition], sql: &mut String, params: &mut Vec<Value>) {
        if conditions.is_empty() {
            return;
        }
        sql.push_str(" WHERE ");
        for (i, condition) in conditions.iter().enumerate() {
            if i > 0 {
                sql.push_str(" AND ");
            }
            self.write_condition(condition, sql, params);
        }
    }

    fn write_condition(&self, condition: &Condition, sql: &mut String, params: &mut Vec<Value>) {
        match condition {
            Condition::And(children) => self.write_group(children, " AND ", "1=1", sql, params),
            Condition::Or(children) => self.write_group(children, " OR ", "1=0", sql, params),
            Condition::Compare { left, op, right } => {
                sql.push_str(&quote_column(left));
                sql.push(' ');
                sql.push_str(op.sql());
                sql.push(' ');
                match right {
                    Operand::Column(column) => sql.push_str(&quote_column(column)),
                    Operand::Value(value) => {
                        let ph = self.push_param(value, params);
                        sql.push_str(&ph);
                    }
                    Operand::Now => sql.push_str(self.backend.now_sql()),
                }
            }
            Condition::IsNull { column, negated } => {
                sql.push_str(&quote_column(column));
                sql.push_str(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Condition::In { column, values } => {
                if values.is_empty() {
                    sql.push_str("1=0");
                    return;
                }
                let placeholders: Vec<String> =
                    values.iter().map(|v| self.push_param(v, params)).collect();
                sql.push_str(&format!(
                    "{} IN ({})",
                    quote_column(column),
                    placeholders.join(", ")
                ));
            }
            Condition::Exists(query) => {
                sql.push_str("EXISTS (");
                self.write_select(query, sql, params);
                sql.push(')');
            }
            Condition::NotExists(query) => {
                sql.push_str("NOT EXISTS (");
                self.write_select(query, sql, params);
                sql.push(')');
            }
        }
    }

    fn write_group(
        &self,
        children: &[Condition],
        separator: &str,
        empty: &str,
        sql: &mut String,
        params: &mut Vec<Value>,
    ) {
        if children.is_empty() {
            sql.push_str(empty);
            return;
        }
        sql.push('(');
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                sql.push_str(separator);
            }
            self.write_condition(child, sql, params);
        }
        sql.push(')');
    }
}
