//! PostgreSQL database backend using `tokio-postgres` and `deadpool-postgres`.
//!
//! This module provides the [`PostgresBackend`] which implements the
//! [`DatabaseBackend`](crate::base::DatabaseBackend) trait using connection
//! pooling via `deadpool-postgres`.
//!
//! Integer parameters are bound as `INT8`, so integer key columns compared
//! against parameters should be declared `BIGINT`.

use oqb_core::{OqbError, OqbResult};
use oqb_db::query::compiler::{quote_ident, DatabaseBackendType};
use oqb_db::value::Value;
use oqb_db::Row;
use tokio_postgres::types::ToSql;

use crate::base::{DatabaseBackend, DatabaseConfig};

type SqlParam = Box<dyn ToSql + Sync + Send>;

/// A PostgreSQL database backend.
pub struct PostgresBackend {
    pool: deadpool_postgres::Pool,
}

impl PostgresBackend {
    /// Creates a new `PostgresBackend` from a `deadpool-postgres` pool.
    pub const fn new(pool: deadpool_postgres::Pool) -> Self {
        Self { pool }
    }

    /// Creates a new backend from a [`DatabaseConfig`].
    pub fn from_config(config: &DatabaseConfig) -> OqbResult<Self> {
        let mut pg_config = deadpool_postgres::Config::new();
        pg_config.dbname = Some(config.name.clone());
        pg_config.host = config.host.clone();
        pg_config.port = config.port;
        pg_config.user = config.user.clone();
        pg_config.password = config.password.clone();
        pg_config.pool = Some(deadpool_postgres::PoolConfig::new(config.max_connections));

        let pool = pg_config
            .create_pool(Some(deadpool_postgres::Runtime::Tokio1), tokio_postgres::NoTls)
            .map_err(|e| OqbError::OperationalError(format!("Failed to create pool: {e}")))?;

        Ok(Self { pool })
    }

    fn value_to_sql_params(params: &[Value]) -> Vec<SqlParam> {
        params.iter().map(Self::value_to_sql).collect()
    }

    fn value_to_sql(value: &Value) -> SqlParam {
        match value {
            Value::Null => Box::new(Option::<String>::None),
            Value::Bool(b) => Box::new(*b),
            Value::Int(i) => Box::new(*i),
            Value::Float(f) => Box::new(*f),
            Value::String(s) => Box::new(s.clone()),
            Value::Bytes(b) => Box::new(b.clone()),
            Value::Date(d) => Box::new(*d),
            Value::DateTime(dt) => Box::new(*dt),
            Value::DateTimeTz(dt) => Box::new(*dt),
            Value::Time(t) => Box::new(*t),
            Value::Uuid(u) => Box::new(*u),
            Value::Json(j) => Box::new(j.clone()),
            Value::List(items) => Self::list_to_sql(items, value),
        }
    }

    /// Homogeneous lists bind as native arrays; anything else as JSON.
    fn list_to_sql(items: &[Value], whole: &Value) -> SqlParam {
        if let Some(ints) = items.iter().map(Value::as_int).collect::<Option<Vec<_>>>() {
            return Box::new(ints);
        }
        if let Some(texts) = items
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
        {
            return Box::new(texts);
        }
        if let Some(flags) = items.iter().map(Value::as_bool).collect::<Option<Vec<_>>>() {
            return Box::new(flags);
        }
        Box::new(whole.to_json())
    }

    fn convert_row(pg_row: &tokio_postgres::Row) -> Row {
        use tokio_postgres::types::Type;

        fn cell<'a, T>(row: &'a tokio_postgres::Row, i: usize, wrap: impl FnOnce(T) -> Value) -> Value
        where
            T: tokio_postgres::types::FromSql<'a>,
        {
            row.try_get::<_, Option<T>>(i)
                .ok()
                .flatten()
                .map_or(Value::Null, wrap)
        }

        let columns: Vec<String> = pg_row
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let values: Vec<Value> = pg_row
            .columns()
            .iter()
            .enumerate()
            .map(|(i, col)| match *col.type_() {
                Type::BOOL => cell(pg_row, i, Value::Bool),
                Type::INT2 => cell(pg_row, i, |v: i16| Value::Int(i64::from(v))),
                Type::INT4 => cell(pg_row, i, |v: i32| Value::Int(i64::from(v))),
                Type::INT8 => cell(pg_row, i, Value::Int),
                Type::FLOAT4 => cell(pg_row, i, |v: f32| Value::Float(f64::from(v))),
                Type::FLOAT8 => cell(pg_row, i, Value::Float),
                Type::BYTEA => cell(pg_row, i, Value::Bytes),
                Type::UUID => cell(pg_row, i, Value::Uuid),
                Type::DATE => cell(pg_row, i, Value::Date),
                Type::TIMESTAMP => cell(pg_row, i, Value::DateTime),
                Type::TIMESTAMPTZ => cell(pg_row, i, |v: chrono::DateTime<chrono::Utc>| {
                    Value::DateTimeTz(v)
                }),
                Type::TIME => cell(pg_row, i, Value::Time),
                Type::JSON | Type::JSONB => cell(pg_row, i, Value::Json),
                Type::INT4_ARRAY => cell(pg_row, i, |v: Vec<i32>| {
                    Value::List(v.into_iter().map(|x| Value::Int(i64::from(x))).collect())
                }),
                Type::INT8_ARRAY => cell(pg_row, i, |v: Vec<i64>| {
                    Value::List(v.into_iter().map(Value::Int).collect())
                }),
                Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => cell(pg_row, i, |v: Vec<String>| {
                    Value::List(v.into_iter().map(Value::String).collect())
                }),
                // Fall back to string representation for unknown types
                _ => cell(pg_row, i, Value::String),
            })
            .collect();

        Row::new(columns, values)
    }

    async fn client(&self) -> OqbResult<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| OqbError::OperationalError(format!("Pool error: {e}")))
    }
}

fn param_refs(params: &[SqlParam]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|p| p.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

#[async_trait::async_trait]
impl DatabaseBackend for PostgresBackend {
    fn vendor(&self) -> &str {
        "postgresql"
    }

    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::PostgreSQL
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> OqbResult<u64> {
        let client = self.client().await?;
        let sql_params = Self::value_to_sql_params(params);
        client
            .execute(sql, &param_refs(&sql_params))
            .await
            .map_err(|e| OqbError::DatabaseError(format!("{e}")))
    }

    async fn query(&self, sql: &str, params: &[Value]) -> OqbResult<Vec<Row>> {
        let client = self.client().await?;
        let sql_params = Self::value_to_sql_params(params);
        let rows = client
            .query(sql, &param_refs(&sql_params))
            .await
            .map_err(|e| OqbError::DatabaseError(format!("{e}")))?;

        Ok(rows.iter().map(Self::convert_row).collect())
    }
}

#[async_trait::async_trait]
impl oqb_db::DbExecutor for PostgresBackend {
    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::PostgreSQL
    }

    async fn execute_sql(&self, sql: &str, params: &[Value]) -> OqbResult<u64> {
        self.execute(sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> OqbResult<Vec<Row>> {
        DatabaseBackend::query(self, sql, params).await
    }

    async fn query_one(&self, sql: &str, params: &[Value]) -> OqbResult<Row> {
        DatabaseBackend::query_one(self, sql, params).await
    }

    async fn insert_returning_id(
        &self,
        sql: &str,
        params: &[Value],
        pk_column: &str,
    ) -> OqbResult<Value> {
        let sql_returning = returning(sql, pk_column);
        let rows = DatabaseBackend::query(self, &sql_returning, params).await?;
        match rows.into_iter().next() {
            Some(row) => row.get::<Value>(pk_column),
            None => Err(OqbError::DatabaseError(
                "INSERT RETURNING returned no rows".to_string(),
            )),
        }
    }
}

fn returning(sql: &str, pk_column: &str) -> String {
    format!("{sql} RETURNING {}", quote_ident(pk_column))
}
