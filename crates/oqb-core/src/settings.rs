//! Settings for oqb.
//!
//! [`Settings`] is a plain value: it is built once (usually through
//! [`settings_loader`](crate::settings_loader)) and passed explicitly to the
//! pieces that need it. There is no global settings instance.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Database connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// The database engine (`sqlite`, `postgres`).
    pub engine: String,
    /// The database name (or file path for `SQLite`, `:memory:` for in-memory).
    pub name: String,
    /// The database user.
    pub user: String,
    /// The database password.
    pub password: String,
    /// The database host.
    pub host: String,
    /// The database port.
    pub port: u16,
    /// Maximum number of pooled connections (`PostgreSQL` only).
    pub max_connections: usize,
    /// Additional engine-specific options.
    pub options: HashMap<String, String>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            engine: "sqlite".to_string(),
            name: ":memory:".to_string(),
            user: String::new(),
            password: String::new(),
            host: String::new(),
            port: 0,
            max_connections: 16,
            options: HashMap::new(),
        }
    }
}

/// Engine-wide settings.
///
/// # Examples
///
/// ```
/// use oqb_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert!(settings.debug);
/// assert!(!settings.log_queries);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Whether debug mode is enabled (pretty logs instead of JSON).
    pub debug: bool,
    /// Tracing filter directive, e.g. `info` or `oqb::sql=debug`.
    pub log_level: String,
    /// Emit every compiled statement at `info` level.
    pub log_queries: bool,
    /// The database connection.
    pub database: DatabaseSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: true,
            log_level: "info".to_string(),
            log_queries: false,
            database: DatabaseSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let s = Settings::default();
        assert!(s.debug);
        assert_eq!(s.log_level, "info");
        assert!(!s.log_queries);
    }

    #[test]
    fn test_default_database() {
        let db = DatabaseSettings::default();
        assert_eq!(db.engine, "sqlite");
        assert_eq!(db.name, ":memory:");
        assert_eq!(db.max_connections, 16);
    }

    #[test]
    fn test_settings_serde_roundtrip() {
        let s = Settings::default();
        let json = serde_json::to_string(&s).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
