//! Utility functions for oqb.
//!
//! - [`text`]: English inflection helpers used to name nested result slots.

pub mod text;
