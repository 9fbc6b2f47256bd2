//! Table-level constraints checked before a row is inserted.
//!
//! A [`TableConstraint`] wraps a check over the [`Record`] being written.
//! The check either passes, fails (reported with the constraint's configured
//! message), or fails with its own message. A failing constraint that has no
//! message at all is a definition mistake and surfaces as
//! [`OqbError::MissingConstraintMessage`] rather than a validation error.
//!
//! Constraints may belong to groups. Validating without groups runs only the
//! ungrouped constraints; validating with groups also runs constraints that
//! share at least one of them.
//!
//! # Examples
//!
//! ```
//! use oqb_db::constraints::{validate, Check, TableConstraint};
//! use oqb_db::value::{Record, Value};
//!
//! let positive = TableConstraint::new("positive_total", |record: &Record| {
//!     Check::from(record.get("total").and_then(Value::as_int).unwrap_or(0) > 0)
//! })
//! .message("Order total must be positive.");
//!
//! let record = Record::new().with("total", 0_i64);
//! let err = validate(&[positive], &record, None).unwrap_err();
//! assert!(err.to_string().contains("Order total must be positive."));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use oqb_core::{OqbError, OqbResult, ValidationError};

use crate::value::Record;

/// Outcome of a single constraint check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    Pass,
    /// Failed; the constraint's configured message is reported.
    Fail,
    /// Failed with a message supplied by the check itself.
    FailWith(String),
}

impl From<bool> for Check {
    fn from(ok: bool) -> Self {
        if ok {
            Self::Pass
        } else {
            Self::Fail
        }
    }
}

type CheckFn = dyn Fn(&Record) -> Check + Send + Sync;

/// A named check over a record.
#[derive(Clone)]
pub struct TableConstraint {
    name: String,
    check: Arc<CheckFn>,
    message: Option<String>,
    groups: Vec<String>,
}

impl TableConstraint {
    pub fn new(
        name: impl Into<String>,
        check: impl Fn(&Record) -> Check + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            check: Arc::new(check),
            message: None,
            groups: Vec::new(),
        }
    }

    /// Sets the message reported when the check returns [`Check::Fail`].
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Restricts the constraint to the given groups.
    #[must_use]
    pub fn groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the constraint runs for the requested groups.
    fn applies_to(&self, groups: Option<&[String]>) -> bool {
        if self.groups.is_empty() {
            return true;
        }
        groups.is_some_and(|requested| requested.iter().any(|g| self.groups.contains(g)))
    }

    /// Runs the check, returning the failure message if it failed.
    fn evaluate(&self, record: &Record) -> OqbResult<Option<String>> {
        match (self.check)(record) {
            Check::Pass => Ok(None),
            Check::FailWith(message) => Ok(Some(message)),
            Check::Fail => self
                .message
                .clone()
                .map(Some)
                .ok_or_else(|| OqbError::MissingConstraintMessage(self.name.clone())),
        }
    }
}

impl fmt::Debug for TableConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableConstraint")
            .field("name", &self.name)
            .field("message", &self.message)
            .field("groups", &self.groups)
            .finish_non_exhaustive()
    }
}

/// Runs every applicable constraint against `record`.
///
/// All failures are collected into one [`ValidationError`], keyed by
/// constraint name.
pub fn validate(
    constraints: &[TableConstraint],
    record: &Record,
    groups: Option<&[String]>,
) -> OqbResult<()> {
    let mut failures: HashMap<String, Vec<ValidationError>> = HashMap::new();

    for constraint in constraints.iter().filter(|c| c.applies_to(groups)) {
        if let Some(message) = constraint.evaluate(record)? {
            failures
                .entry(constraint.name.clone())
                .or_default()
                .push(ValidationError::new(message, constraint.name.clone()));
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(OqbError::ValidationError(
            ValidationError::with_constraint_errors(failures),
        ))
    }
}
