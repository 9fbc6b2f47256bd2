//! Database executor trait and entity operations.
//!
//! This module defines the [`DbExecutor`] trait that provides the minimal async
//! interface required to run compiled statements, and the [`Finder`] that
//! reads and writes rows of one registered entity through it.
//!
//! The `DbExecutor` trait is implemented by backend types (e.g., `SqliteBackend`,
//! `PostgresBackend`) in the `oqb-db-backends` crate.
//!
//! A find issues at most two statements, the row statement and the count
//! statement, and [`Finder::find_all`] runs them concurrently.

use chrono::{NaiveDateTime, Timelike};
use oqb_core::logging::{query_span, SQL_TARGET};
use oqb_core::{OqbError, OqbResult};
use tracing::Instrument;

use crate::constraints::validate;
use crate::entity::Entity;
use crate::hydrate::hydrate;
use crate::query::compiler::{CompiledStatement, Condition, DatabaseBackendType, Row, SqlCompiler};
use crate::query::join_tree::{JoinTree, ShapeDescriptor};
use crate::query::options::SelectOptions;
use crate::query::renderer::{render, Strategy, COUNT_ALIAS};
use crate::query::where_clause::Where;
use crate::registry::Registry;
use crate::value::{Record, Value};

/// Minimal async database executor trait.
///
/// This is the bridge between the query layer (`oqb-db`) and the concrete
/// database backends (`oqb-db-backends`). [`Finder`] operations accept
/// `&dyn DbExecutor`, which backends implement.
#[async_trait::async_trait]
pub trait DbExecutor: Send + Sync {
    /// Returns the backend type for SQL compilation.
    fn backend_type(&self) -> DatabaseBackendType;

    /// Runs a SQL statement that does not return rows.
    /// Returns the number of rows affected.
    async fn execute_sql(&self, sql: &str, params: &[Value]) -> OqbResult<u64>;

    /// Runs a SQL query and returns all result rows.
    async fn query(&self, sql: &str, params: &[Value]) -> OqbResult<Vec<Row>>;

    /// Runs a SQL query and returns exactly one row.
    /// Returns `DoesNotExist` if no rows, `MultipleObjectsReturned` if more than one.
    async fn query_one(&self, sql: &str, params: &[Value]) -> OqbResult<Row>;

    /// Executes an INSERT and returns the generated value of `pk_column`.
    ///
    /// The default runs the insert and then asks `SQLite` for the last row id.
    /// Backends without `last_insert_rowid()` must override this.
    async fn insert_returning_id(
        &self,
        sql: &str,
        params: &[Value],
        pk_column: &str,
    ) -> OqbResult<Value> {
        self.execute_sql(sql, params).await?;
        let row = self.query("SELECT last_insert_rowid() AS id", &[]).await?;
        if let Some(r) = row.into_iter().next() {
            Ok(r.get::<Value>("id")?)
        } else {
            Err(OqbError::DatabaseError(format!(
                "Failed to retrieve inserted value of '{pk_column}'"
            )))
        }
    }
}

/// Compiled statements and the shape needed to hydrate their rows.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectPlan {
    pub rows: CompiledStatement,
    pub count: CompiledStatement,
    pub shape: ShapeDescriptor,
    pub strategy: Strategy,
}

/// Result of [`Finder::find_all`].
#[derive(Debug, Clone, PartialEq)]
pub struct FindAll {
    /// Hydrated root objects in row order.
    pub rows: Vec<serde_json::Value>,
    /// Number of matching root rows, ignoring limit and offset.
    pub count: u64,
}

/// A primary key lookup for [`Finder::find_one_by_id`].
#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryKey {
    /// Value of a single-column primary key.
    Value(Value),
    /// Column/value pairs, for composite keys.
    Pairs(Vec<(String, Value)>),
}

impl From<Value> for PrimaryKey {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<i64> for PrimaryKey {
    fn from(value: i64) -> Self {
        Self::Value(Value::Int(value))
    }
}

impl From<&str> for PrimaryKey {
    fn from(value: &str) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<uuid::Uuid> for PrimaryKey {
    fn from(value: uuid::Uuid) -> Self {
        Self::Value(Value::Uuid(value))
    }
}

impl<V: Into<Value>> From<Vec<(&str, V)>> for PrimaryKey {
    fn from(pairs: Vec<(&str, V)>) -> Self {
        Self::Pairs(
            pairs
                .into_iter()
                .map(|(column, value)| (column.to_string(), value.into()))
                .collect(),
        )
    }
}

/// Options for [`Finder::insert`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertOptions {
    /// Do not run table constraints.
    pub skip_validation: bool,
    /// Constraint groups to validate; `None` runs ungrouped constraints only.
    pub groups: Option<Vec<String>>,
    pub log: bool,
}

/// Options for [`Finder::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOptions {
    /// Rows to update; local columns only. `None` updates every row.
    pub where_clause: Option<Where>,
    /// Leave `updated_at` untouched.
    pub silent: bool,
    pub log: bool,
}

/// Options for [`Finder::delete`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteOptions {
    /// Rows to delete; local columns only. `None` deletes every row.
    pub where_clause: Option<Where>,
    /// Delete rows even when the entity soft deletes.
    pub override_soft_delete: bool,
    /// Timestamp written to the soft-delete marker instead of now.
    pub delete_time: Option<NaiveDateTime>,
    pub log: bool,
}

/// Reads and writes rows of one registered entity.
///
/// # Examples
///
/// ```no_run
/// # async fn demo(registry: &oqb_db::registry::Registry, db: &dyn oqb_db::executor::DbExecutor) -> oqb_core::OqbResult<()> {
/// use oqb_db::query::include::IncludeOptions;
/// use oqb_db::query::options::SelectOptions;
///
/// let found = registry
///     .finder("customer")?
///     .find_all(db, &SelectOptions::new().include(IncludeOptions::new("orders").required()))
///     .await?;
/// println!("{} customers with orders", found.count);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Finder<'r> {
    registry: &'r Registry,
    entity: &'r Entity,
    log_queries: bool,
}

impl<'r> Finder<'r> {
    /// Returns a finder for `name`, failing with `UnknownEntity`.
    pub fn new(registry: &'r Registry, name: &str) -> OqbResult<Self> {
        Ok(Self {
            registry,
            entity: registry.entity(name)?,
            log_queries: false,
        })
    }

    /// Logs every statement at info level.
    #[must_use]
    pub const fn log_queries(mut self, enabled: bool) -> Self {
        self.log_queries = enabled;
        self
    }

    pub const fn entity(&self) -> &'r Entity {
        self.entity
    }

    /// Compiles a find request without running it.
    pub fn select(
        &self,
        options: &SelectOptions,
        backend: DatabaseBackendType,
    ) -> OqbResult<SelectPlan> {
        let tree = JoinTree::build(self.registry, self.entity.name(), options)?;
        let rendered = render(&tree, &options.order, options.limit, options.offset)?;
        let compiler = SqlCompiler::new(backend);
        Ok(SelectPlan {
            rows: compiler.compile_select(&rendered.rows),
            count: compiler.compile_select(&rendered.count),
            shape: tree.shape,
            strategy: rendered.strategy,
        })
    }

    /// Finds every matching root object and the total count.
    pub async fn find_all(
        &self,
        db: &dyn DbExecutor,
        options: &SelectOptions,
    ) -> OqbResult<FindAll> {
        let loud = self.loud(options.log);
        async {
            let plan = self.select(options, db.backend_type())?;
            log_statement("rows", &plan.rows, loud);
            log_statement("count", &plan.count, loud);

            let (rows, count) = tokio::try_join!(
                db.query(&plan.rows.sql, &plan.rows.params),
                db.query(&plan.count.sql, &plan.count.params),
            )?;

            let hydrated = hydrate(&rows, &plan.shape)?;
            let count = read_count(&count)?;
            tracing::debug!(rows = rows.len(), count, strategy = ?plan.strategy, "find_all complete");
            Ok(FindAll {
                rows: match hydrated {
                    serde_json::Value::Array(items) => items,
                    _ => Vec::new(),
                },
                count,
            })
        }
        .instrument(query_span(self.entity.name()))
        .await
    }

    /// Finds the first matching root object, or `null`.
    pub async fn find_one(
        &self,
        db: &dyn DbExecutor,
        options: &SelectOptions,
    ) -> OqbResult<serde_json::Value> {
        let loud = self.loud(options.log);
        async {
            let mut options = options.clone();
            options.limit = Some(1);
            let mut plan = self.select(&options, db.backend_type())?;
            plan.shape.plural = false;
            log_statement("rows", &plan.rows, loud);

            let rows = db.query(&plan.rows.sql, &plan.rows.params).await?;
            hydrate(&rows, &plan.shape)
        }
        .instrument(query_span(self.entity.name()))
        .await
    }

    /// Finds the object with the given primary key, AND-ed with any filter
    /// in `options`.
    ///
    /// A single value requires a single-column primary key; composite keys
    /// must be given as column/value pairs.
    pub async fn find_one_by_id(
        &self,
        db: &dyn DbExecutor,
        id: impl Into<PrimaryKey>,
        options: &SelectOptions,
    ) -> OqbResult<serde_json::Value> {
        let key = self.key_filter(id.into())?;
        let options = options.clone().filter(key);
        self.find_one(db, &options).await
    }

    /// Counts matching root rows.
    pub async fn count(&self, db: &dyn DbExecutor, options: &SelectOptions) -> OqbResult<u64> {
        let loud = self.loud(options.log);
        async {
            let plan = self.select(options, db.backend_type())?;
            log_statement("count", &plan.count, loud);
            let rows = db.query(&plan.count.sql, &plan.count.params).await?;
            read_count(&rows)
        }
        .instrument(query_span(self.entity.name()))
        .await
    }

    /// Inserts one row and returns its primary key.
    ///
    /// Timestamped entities get `created_at` and `updated_at` unless given.
    /// Table constraints run unless `skip_validation` is set.
    pub async fn insert(
        &self,
        db: &dyn DbExecutor,
        mut record: Record,
        options: &InsertOptions,
    ) -> OqbResult<Record> {
        self.check_columns(&record)?;
        if self.entity.has_timestamps() {
            let now = Value::DateTime(now());
            for column in ["created_at", "updated_at"] {
                if !record.contains(column) {
                    record.set(column, now.clone());
                }
            }
        }
        if !options.skip_validation {
            validate(self.entity.constraints(), &record, options.groups.as_deref())?;
        }

        let pk = self.entity.primary_key_names();
        let given: Record = pk
            .iter()
            .filter_map(|name| record.get(name).map(|v| ((*name).to_string(), v.clone())))
            .collect();

        let compiler = SqlCompiler::new(db.backend_type());
        let statement = compiler.compile_insert(self.entity.name(), &record.into_fields());
        log_statement("insert", &statement, self.loud(options.log));

        if given.len() == pk.len() {
            db.execute_sql(&statement.sql, &statement.params).await?;
            return Ok(given);
        }
        match pk.as_slice() {
            [single] => {
                let id = db
                    .insert_returning_id(&statement.sql, &statement.params, single)
                    .await?;
                Ok(Record::new().with(*single, id))
            }
            _ => Err(OqbError::InvalidQuery(format!(
                "insert into '{}' must give every primary key column ({})",
                self.entity.name(),
                pk.join(", ")
            ))),
        }
    }

    /// Updates matching rows and returns the number affected.
    pub async fn update(
        &self,
        db: &dyn DbExecutor,
        mut values: Record,
        options: &UpdateOptions,
    ) -> OqbResult<u64> {
        if values.is_empty() {
            return Ok(0);
        }
        self.check_columns(&values)?;
        if self.entity.has_timestamps() && !options.silent && !values.contains("updated_at") {
            values.set("updated_at", Value::DateTime(now()));
        }
        let conditions = self.local_conditions(options.where_clause.as_ref())?;

        let compiler = SqlCompiler::new(db.backend_type());
        let statement =
            compiler.compile_update(self.entity.name(), &values.into_fields(), &conditions);
        log_statement("update", &statement, self.loud(options.log));
        db.execute_sql(&statement.sql, &statement.params).await
    }

    /// Deletes matching rows and returns the number affected.
    ///
    /// Soft-deleting entities get their marker set instead, unless
    /// `override_soft_delete` is set.
    pub async fn delete(&self, db: &dyn DbExecutor, options: &DeleteOptions) -> OqbResult<u64> {
        let conditions = self.local_conditions(options.where_clause.as_ref())?;
        let compiler = SqlCompiler::new(db.backend_type());

        let statement = match self.entity.soft_delete_column() {
            Some(marker) if !options.override_soft_delete => {
                let time = options.delete_time.unwrap_or_else(now);
                compiler.compile_update(
                    self.entity.name(),
                    &[(marker.to_string(), Value::DateTime(time))],
                    &conditions,
                )
            }
            _ => compiler.compile_delete(self.entity.name(), &conditions),
        };
        log_statement("delete", &statement, self.loud(options.log));
        db.execute_sql(&statement.sql, &statement.params).await
    }

    const fn loud(&self, requested: bool) -> bool {
        requested || self.log_queries
    }

    fn check_columns(&self, record: &Record) -> OqbResult<()> {
        for column in record.columns() {
            self.entity.require_column(column)?;
        }
        Ok(())
    }

    fn local_conditions(&self, where_clause: Option<&Where>) -> OqbResult<Vec<Condition>> {
        let Some(where_clause) = where_clause else {
            return Ok(Vec::new());
        };
        if !where_clause.relationship_paths().is_empty() {
            return Err(OqbError::InvalidQuery(format!(
                "write filters on '{}' may only use its own columns",
                self.entity.name()
            )));
        }
        Ok(where_clause
            .to_condition(self.entity.name())
            .into_iter()
            .collect())
    }

    fn key_filter(&self, key: PrimaryKey) -> OqbResult<Where> {
        match key {
            PrimaryKey::Value(value) => match self.entity.primary_key_names().as_slice() {
                [single] => Ok(Where::eq(*single, value)),
                columns => Err(OqbError::AmbiguousCompositeKey(format!(
                    "'{}' has primary key ({}); give column/value pairs",
                    self.entity.name(),
                    columns.join(", ")
                ))),
            },
            PrimaryKey::Pairs(pairs) => {
                for (column, _) in &pairs {
                    self.entity.require_column(column)?;
                }
                Ok(Where::all(
                    pairs
                        .into_iter()
                        .map(|(column, value)| Where::eq(column, value))
                        .collect(),
                ))
            }
        }
    }
}

/// Current UTC time, truncated to whole seconds so it compares cleanly with
/// the database's own timestamp text.
fn now() -> NaiveDateTime {
    let now = chrono::Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}

fn read_count(rows: &[Row]) -> OqbResult<u64> {
    let row = rows
        .first()
        .ok_or_else(|| OqbError::DatabaseError("count statement returned no rows".to_string()))?;
    let count: i64 = row.get(COUNT_ALIAS)?;
    u64::try_from(count)
        .map_err(|_| OqbError::DatabaseError(format!("negative count returned: {count}")))
}

fn log_statement(kind: &str, statement: &CompiledStatement, loud: bool) {
    if loud {
        tracing::info!(target: SQL_TARGET, kind, sql = %statement.sql, params = ?statement.params);
    } else {
        tracing::debug!(target: SQL_TARGET, kind, sql = %statement.sql, params = ?statement.params);
    }
}
