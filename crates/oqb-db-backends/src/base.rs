//! Base database backend trait and connection configuration.
//!
//! This module defines the [`DatabaseBackend`] trait that all backend
//! implementations must satisfy, the [`DatabaseConfig`] that describes a
//! connection, and [`connect`], which opens the backend a config names.

use std::collections::HashMap;
use std::sync::Arc;

use oqb_core::settings::DatabaseSettings;
use oqb_core::{OqbError, OqbResult};
use oqb_db::query::compiler::{DatabaseBackendType, SqlCompiler};
use oqb_db::value::Value;
use oqb_db::{DbExecutor, Row};

/// The core trait for database backends.
///
/// Each database engine (PostgreSQL, SQLite) implements this trait to
/// provide a uniform interface for executing SQL and obtaining a SQL
/// compiler configured for the backend's dialect.
///
/// All methods are async because database operations are inherently I/O-bound.
/// Backends that use synchronous drivers (like `rusqlite`) wrap operations
/// in `spawn_blocking` to maintain the async interface.
#[async_trait::async_trait]
pub trait DatabaseBackend: Send + Sync {
    /// Returns the vendor name (e.g., "postgresql", "sqlite").
    fn vendor(&self) -> &str;

    /// Returns the backend type enum for use with the SQL compiler.
    fn backend_type(&self) -> DatabaseBackendType;

    /// Executes a SQL statement that does not return rows.
    ///
    /// Returns the number of rows affected.
    async fn execute(&self, sql: &str, params: &[Value]) -> OqbResult<u64>;

    /// Executes a SQL query and returns all result rows.
    async fn query(&self, sql: &str, params: &[Value]) -> OqbResult<Vec<Row>>;

    /// Executes a SQL query and returns exactly one row.
    ///
    /// Returns [`OqbError::DoesNotExist`] if no rows are returned, or
    /// [`OqbError::MultipleObjectsReturned`] if more than one row is returned.
    async fn query_one(&self, sql: &str, params: &[Value]) -> OqbResult<Row> {
        let mut rows = self.query(sql, params).await?;
        match rows.len() {
            0 => Err(OqbError::DoesNotExist("No rows returned".to_string())),
            1 => rows
                .pop()
                .ok_or_else(|| OqbError::DoesNotExist("No rows returned".to_string())),
            n => Err(OqbError::MultipleObjectsReturned(format!(
                "Expected 1 row, got {n}"
            ))),
        }
    }

    /// Returns a SQL compiler configured for this backend's dialect.
    fn compiler(&self) -> SqlCompiler {
        SqlCompiler::new(self.backend_type())
    }
}

/// Configuration for connecting to a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// The backend type.
    pub backend: DatabaseBackendType,
    /// The database name or file path.
    pub name: String,
    /// The database host (for network-based backends).
    pub host: Option<String>,
    /// The database port.
    pub port: Option<u16>,
    /// The database user.
    pub user: Option<String>,
    /// The database password.
    pub password: Option<String>,
    /// Pool size for pooled backends.
    pub max_connections: usize,
    /// Additional connection options.
    pub options: HashMap<String, String>,
}

impl DatabaseConfig {
    fn local(backend: DatabaseBackendType, name: String) -> Self {
        Self {
            backend,
            name,
            host: None,
            port: None,
            user: None,
            password: None,
            max_connections: 1,
            options: HashMap::new(),
        }
    }

    /// Creates a configuration for an in-memory SQLite database.
    pub fn sqlite_memory() -> Self {
        Self::local(DatabaseBackendType::SQLite, ":memory:".to_string())
    }

    /// Creates a configuration for a SQLite file database.
    pub fn sqlite_file(path: impl Into<String>) -> Self {
        Self::local(DatabaseBackendType::SQLite, path.into())
    }

    /// Creates a configuration for a PostgreSQL database.
    pub fn postgres(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: Some(host.into()),
            port: Some(port),
            user: Some(user.into()),
            password: Some(password.into()),
            max_connections: 16,
            ..Self::local(DatabaseBackendType::PostgreSQL, name.into())
        }
    }

    /// Builds a configuration from loaded settings.
    ///
    /// The engine is matched case-insensitively; `postgres` and `postgresql`
    /// are both accepted. Empty strings and a zero port count as unset.
    pub fn from_settings(settings: &DatabaseSettings) -> OqbResult<Self> {
        let backend = match settings.engine.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => DatabaseBackendType::SQLite,
            "postgres" | "postgresql" => DatabaseBackendType::PostgreSQL,
            other => {
                return Err(OqbError::ConfigurationError(format!(
                    "Unsupported database engine: {other}"
                )))
            }
        };
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Ok(Self {
            backend,
            name: settings.name.clone(),
            host: non_empty(&settings.host),
            port: (settings.port != 0).then_some(settings.port),
            user: non_empty(&settings.user),
            password: non_empty(&settings.password),
            max_connections: settings.max_connections.max(1),
            options: settings.options.clone(),
        })
    }
}

/// Opens the backend named by `config`.
///
/// Fails with [`OqbError::ConfigurationError`] when the backend's feature is
/// not compiled in.
pub fn connect(config: &DatabaseConfig) -> OqbResult<Arc<dyn DbExecutor>> {
    tracing::info!(backend = ?config.backend, name = %config.name, "opening database");
    match config.backend {
        #[cfg(feature = "sqlite")]
        DatabaseBackendType::SQLite => Ok(Arc::new(crate::sqlite::SqliteBackend::open(
            &config.name,
        )?)),
        #[cfg(feature = "postgres")]
        DatabaseBackendType::PostgreSQL => Ok(Arc::new(
            crate::postgresql::PostgresBackend::from_config(config)?,
        )),
        #[allow(unreachable_patterns)]
        other => Err(OqbError::ConfigurationError(format!(
            "Backend {other:?} is not enabled in this build"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_sqlite_memory() {
        let cfg = DatabaseConfig::sqlite_memory();
        assert_eq!(cfg.backend, DatabaseBackendType::SQLite);
        assert_eq!(cfg.name, ":memory:");
        assert!(cfg.host.is_none());
    }

    #[test]
    fn test_database_config_postgres() {
        let cfg = DatabaseConfig::postgres("mydb", "localhost", 5432, "user", "pass");
        assert_eq!(cfg.backend, DatabaseBackendType::PostgreSQL);
        assert_eq!(cfg.host.as_deref(), Some("localhost"));
        assert_eq!(cfg.port, Some(5432));
        assert_eq!(cfg.max_connections, 16);
    }

    #[test]
    fn test_from_settings_defaults_to_sqlite_memory() {
        let cfg = DatabaseConfig::from_settings(&DatabaseSettings::default()).unwrap();
        assert_eq!(cfg, DatabaseConfig {
            max_connections: 16,
            ..DatabaseConfig::sqlite_memory()
        });
    }

    #[test]
    fn test_from_settings_postgres() {
        let settings = DatabaseSettings {
            engine: "PostgreSQL".to_string(),
            name: "shop".to_string(),
            host: "db".to_string(),
            port: 5433,
            user: "app".to_string(),
            ..DatabaseSettings::default()
        };
        let cfg = DatabaseConfig::from_settings(&settings).unwrap();
        assert_eq!(cfg.backend, DatabaseBackendType::PostgreSQL);
        assert_eq!(cfg.host.as_deref(), Some("db"));
        assert_eq!(cfg.port, Some(5433));
        assert_eq!(cfg.user.as_deref(), Some("app"));
        assert!(cfg.password.is_none());
    }

    #[test]
    fn test_from_settings_unknown_engine() {
        let settings = DatabaseSettings {
            engine: "oracle".to_string(),
            ..DatabaseSettings::default()
        };
        assert!(matches!(
            DatabaseConfig::from_settings(&settings),
            Err(OqbError::ConfigurationError(_))
        ));
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_connect_sqlite_memory() {
        let db = connect(&DatabaseConfig::sqlite_memory()).unwrap();
        assert_eq!(db.backend_type(), DatabaseBackendType::SQLite);
        let rows = db.query("SELECT 1 AS one", &[]).await.unwrap();
        assert_eq!(rows[0].get::<i64>("one").unwrap(), 1);
    }
}
