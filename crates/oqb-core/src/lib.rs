//! # oqb-core
//!
//! Core types, settings, logging, and error types for oqb.
//! This crate has no database dependencies and provides the foundation for the
//! query compiler and the backends.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`settings`] - Engine settings (logging and database connection)
//! - [`settings_loader`] - Loading settings from TOML, JSON, and the environment
//! - [`logging`] - Tracing-based logging integration
//! - [`utils`] - Text inflection helpers

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;
pub mod utils;

// Re-export the most commonly used types at the crate root.
pub use error::{OqbError, OqbResult, ValidationError};
pub use settings::{DatabaseSettings, Settings};
