//! Core error types for oqb.
//!
//! [`OqbError`] covers every failure the engine can surface: definition errors
//! raised while entities and associations are registered, compilation errors
//! raised while a request is turned into SQL, and execution errors propagated
//! from the database layer.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// A validation failure produced by a table constraint.
///
/// Validation errors are either simple (a single message) or compound
/// (holding the messages of several failed constraints keyed by constraint name).
///
/// # Examples
///
/// ```
/// use oqb_core::error::ValidationError;
///
/// let err = ValidationError::new("Order total must be positive.", "total_positive");
/// assert_eq!(err.to_string(), "Order total must be positive.");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The primary error message.
    pub message: String,
    /// A short code identifying the failed constraint.
    pub code: String,
    /// Per-constraint validation errors, keyed by constraint name.
    pub constraint_errors: HashMap<String, Vec<Self>>,
}

impl ValidationError {
    /// Creates a new `ValidationError` with a message and code.
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            constraint_errors: HashMap::new(),
        }
    }

    /// Creates a `ValidationError` grouping the errors of several constraints.
    pub fn with_constraint_errors(constraint_errors: HashMap<String, Vec<Self>>) -> Self {
        Self {
            message: String::new(),
            code: String::new(),
            constraint_errors,
        }
    }

    /// Returns every message held by this error, flattened.
    pub fn messages(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.message.is_empty() {
            out.push(self.message.clone());
        }
        let mut names: Vec<&String> = self.constraint_errors.keys().collect();
        names.sort();
        for name in names {
            for error in &self.constraint_errors[name] {
                out.extend(error.messages());
            }
        }
        out
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.messages().join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// The primary error type for oqb.
#[derive(Error, Debug)]
pub enum OqbError {
    // ── Definition errors ────────────────────────────────────────────

    /// An include, where clause, or order entry names an association that the
    /// entity does not declare.
    #[error("Cannot find association: {association} on entity: {entity}")]
    UnknownRelationship { entity: String, association: String },

    /// A single foreign-key column was given where the addressed side has a
    /// composite primary key.
    #[error("Ambiguous composite key: {0}")]
    AmbiguousCompositeKey(String),

    /// An entity name that was never registered.
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// A column name that the entity does not declare.
    #[error("Unknown column: {column} on entity: {entity}")]
    UnknownColumn { entity: String, column: String },

    /// An entity was registered twice.
    #[error("Entity already registered: {0}")]
    DuplicateEntity(String),

    /// An entity declares no primary key column.
    #[error("Entity {0} has no primary key")]
    MissingPrimaryKey(String),

    /// A table constraint failed and has no message configured.
    #[error("No error given for constraint: {0}")]
    MissingConstraintMessage(String),

    // ── Compilation errors ───────────────────────────────────────────

    /// The request cannot be expressed as SQL.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    // ── Execution errors ─────────────────────────────────────────────

    /// Raised when a query expected exactly one result but found none.
    #[error("Object does not exist: {0}")]
    DoesNotExist(String),

    /// Raised when a query expected exactly one result but found multiple.
    #[error("Multiple objects returned when one expected: {0}")]
    MultipleObjectsReturned(String),

    /// A generic database error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// An operational database error (connection failure, etc.).
    #[error("Operational error: {0}")]
    OperationalError(String),

    // ── Validation ───────────────────────────────────────────────────

    /// One or more table constraints failed.
    #[error("Validation error: {0}")]
    ValidationError(ValidationError),

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    // ── Serialization ────────────────────────────────────────────────

    /// An error occurred during serialization or deserialization.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OqbError {
    /// Returns `true` for errors caused by the request or the entity
    /// definitions rather than by the database.
    pub const fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownRelationship { .. }
                | Self::AmbiguousCompositeKey(_)
                | Self::UnknownEntity(_)
                | Self::UnknownColumn { .. }
                | Self::DuplicateEntity(_)
                | Self::MissingPrimaryKey(_)
                | Self::MissingConstraintMessage(_)
                | Self::InvalidQuery(_)
        )
    }
}

impl From<ValidationError> for OqbError {
    fn from(err: ValidationError) -> Self {
        Self::ValidationError(err)
    }
}

impl From<serde_json::Error> for OqbError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// A convenience type alias for results using [`OqbError`].
pub type OqbResult<T> = Result<T, OqbError>;
