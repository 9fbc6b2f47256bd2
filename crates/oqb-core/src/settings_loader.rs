//! Settings loading from configuration files.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `OQB_DEBUG` | `debug` |
//! | `OQB_LOG_LEVEL` | `log_level` |
//! | `OQB_LOG_QUERIES` | `log_queries` |
//! | `OQB_DATABASE_ENGINE` | `database.engine` |
//! | `OQB_DATABASE_NAME` | `database.name` |
//! | `OQB_DATABASE_HOST` | `database.host` |
//! | `OQB_DATABASE_PORT` | `database.port` |
//! | `OQB_DATABASE_USER` | `database.user` |
//! | `OQB_DATABASE_PASSWORD` | `database.password` |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use oqb_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file_with_env("config/oqb.toml").unwrap();
//! ```

use std::path::Path;

use crate::error::OqbError;
use crate::settings::Settings;

/// Loads settings from a TOML string.
///
/// Keys missing from the TOML keep their default values, including keys
/// nested inside the `[database]` table.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, OqbError> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| OqbError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;
    merge_onto_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, OqbError> {
    let content = read_config(path.as_ref(), "TOML")?;
    from_toml_str(&content)
}

/// Loads settings from a TOML file and then applies environment variable overrides.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Settings, OqbError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from a JSON string.
pub fn from_json_str(json_str: &str) -> Result<Settings, OqbError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| OqbError::ConfigurationError(format!("Failed to parse JSON: {e}")))?;
    merge_onto_defaults(json_value, "JSON")
}

/// Loads settings from a JSON file.
pub fn from_json_file(path: impl AsRef<Path>) -> Result<Settings, OqbError> {
    let content = read_config(path.as_ref(), "JSON")?;
    from_json_str(&content)
}

/// Loads settings from a JSON file and then applies environment variable overrides.
pub fn from_json_file_with_env(path: impl AsRef<Path>) -> Result<Settings, OqbError> {
    let mut settings = from_json_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> Settings {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies `OQB_*` environment variable overrides to a settings struct.
///
/// Boolean variables accept "true"/"1"/"yes"; anything else means false.
/// A port that does not parse is ignored.
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(val) = std::env::var("OQB_DEBUG") {
        settings.debug = parse_flag(&val);
    }

    if let Ok(val) = std::env::var("OQB_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Ok(val) = std::env::var("OQB_LOG_QUERIES") {
        settings.log_queries = parse_flag(&val);
    }

    let db = &mut settings.database;

    if let Ok(val) = std::env::var("OQB_DATABASE_ENGINE") {
        db.engine = val;
    }

    if let Ok(val) = std::env::var("OQB_DATABASE_NAME") {
        db.name = val;
    }

    if let Ok(val) = std::env::var("OQB_DATABASE_HOST") {
        db.host = val;
    }

    if let Ok(val) = std::env::var("OQB_DATABASE_PORT") {
        if let Ok(port) = val.parse::<u16>() {
            db.port = port;
        }
    }

    if let Ok(val) = std::env::var("OQB_DATABASE_USER") {
        db.user = val;
    }

    if let Ok(val) = std::env::var("OQB_DATABASE_PASSWORD") {
        db.password = val;
    }
}

// ============================================================
// Helpers
// ============================================================

fn parse_flag(val: &str) -> bool {
    matches!(val.to_lowercase().as_str(), "true" | "1" | "yes")
}

fn read_config(path: &Path, format: &str) -> Result<String, OqbError> {
    std::fs::read_to_string(path).map_err(|e| {
        OqbError::ConfigurationError(format!(
            "Failed to read {format} file '{}': {e}",
            path.display()
        ))
    })
}

fn merge_onto_defaults(value: serde_json::Value, format: &str) -> Result<Settings, OqbError> {
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        OqbError::ConfigurationError(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, value);
    serde_json::from_value(merged).map_err(|e| {
        OqbError::ConfigurationError(format!("Failed to deserialize settings from {format}: {e}"))
    })
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = match base_map.remove(&key) {
                    Some(base_v) => merge_json(base_v, override_v),
                    None => override_v,
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}
