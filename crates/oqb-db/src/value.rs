//! Value types for representing database values in a backend-agnostic way.
//!
//! The [`Value`] enum is used for query parameters and raw result cells.
//! [`Value::coerce`] turns a raw cell into the declared column type during
//! hydration, and [`Value::to_json`] produces the scalar placed in the nested
//! output. [`Record`] is an ordered set of column/value pairs used for writes.

use std::fmt;

use crate::entity::ColumnType;

/// A backend-agnostic representation of a database value.
///
/// # Examples
///
/// ```
/// use oqb_db::value::Value;
///
/// let v = Value::from(42_i64);
/// assert_eq!(v, Value::Int(42));
///
/// let v = Value::from("hello");
/// assert_eq!(v, Value::String("hello".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    /// SQL NULL.
    Null,
    /// A boolean value.
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit floating-point number.
    Float(f64),
    /// A UTF-8 string.
    String(String),
    /// Raw binary data.
    Bytes(Vec<u8>),
    /// A date without time.
    Date(chrono::NaiveDate),
    /// A date and time without timezone.
    DateTime(chrono::NaiveDateTime),
    /// A date and time with UTC timezone.
    DateTimeTz(chrono::DateTime<chrono::Utc>),
    /// A time without date.
    Time(chrono::NaiveTime),
    /// A UUID value.
    Uuid(uuid::Uuid),
    /// A JSON value.
    Json(serde_json::Value),
    /// A list of values (IN lists, array columns).
    List(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Date(d) => write!(f, "{d}"),
            Self::DateTime(dt) => write!(f, "{dt}"),
            Self::DateTimeTz(dt) => write!(f, "{dt}"),
            Self::Time(t) => write!(f, "{t}"),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Json(j) => write!(f, "{j}"),
            Self::List(vals) => {
                write!(f, "[")?;
                for (i, v) in vals.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
        }
    }
}

// ── From implementations ───────────────────────────────────────────────

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<chrono::NaiveDate> for Value {
    fn from(v: chrono::NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<chrono::NaiveDateTime> for Value {
    fn from(v: chrono::NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for Value {
    fn from(v: chrono::DateTime<chrono::Utc>) -> Self {
        Self::DateTimeTz(v)
    }
}

impl From<chrono::NaiveTime> for Value {
    fn from(v: chrono::NaiveTime) -> Self {
        Self::Time(v)
    }
}

impl From<uuid::Uuid> for Value {
    fn from(v: uuid::Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Self::Null,
        }
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

impl Value {
    /// Returns `true` if this value is `Null`.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Attempts to extract a boolean value.
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Attempts to extract an integer value.
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Attempts to extract a float value.
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Attempts to extract a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Converts a plain JSON value (as found in request payloads) to a `Value`.
    ///
    /// Integral numbers become `Int`, other numbers `Float`, arrays `List`,
    /// and objects are kept as `Json`.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or(f64::NAN)), Self::Int),
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            serde_json::Value::Object(_) => Self::Json(json.clone()),
        }
    }

    /// Converts this value to the JSON scalar surfaced in hydrated output.
    ///
    /// Dates and times use ISO-8601 text, bytes become an array of numbers,
    /// and non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Bytes(b) => serde_json::Value::Array(
                b.iter().map(|byte| serde_json::Value::from(*byte)).collect(),
            ),
            Self::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
            Self::DateTime(dt) => {
                serde_json::Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            Self::DateTimeTz(dt) => serde_json::Value::String(dt.to_rfc3339()),
            Self::Time(t) => serde_json::Value::String(t.format("%H:%M:%S%.f").to_string()),
            Self::Uuid(u) => serde_json::Value::String(u.to_string()),
            Self::Json(j) => j.clone(),
            Self::List(vals) => serde_json::Value::Array(vals.iter().map(Self::to_json).collect()),
        }
    }

    /// Coerces a raw result cell to the declared column type.
    ///
    /// Drivers report storage types (`SQLite` has no boolean or date type), so
    /// integers become booleans, text becomes dates or JSON, and so on. A value
    /// that cannot be converted is returned unchanged.
    #[must_use]
    pub fn coerce(self, column_type: ColumnType) -> Self {
        match (column_type, self) {
            (_, Self::Null) => Self::Null,
            (ColumnType::Boolean, Self::Int(i)) => Self::Bool(i != 0),
            (ColumnType::Boolean, Self::String(s)) => match s.to_lowercase().as_str() {
                "true" | "t" | "1" | "yes" => Self::Bool(true),
                "false" | "f" | "0" | "no" => Self::Bool(false),
                _ => Self::String(s),
            },
            (ColumnType::Integer, Self::Float(f)) if f.fract() == 0.0 => {
                #[allow(clippy::cast_possible_truncation)]
                let i = f as i64;
                Self::Int(i)
            }
            (ColumnType::Integer, Self::Bool(b)) => Self::Int(i64::from(b)),
            (ColumnType::Integer, Self::String(s)) => {
                s.trim().parse::<i64>().map_or(Self::String(s), Self::Int)
            }
            #[allow(clippy::cast_precision_loss)]
            (ColumnType::Float, Self::Int(i)) => Self::Float(i as f64),
            (ColumnType::Float, Self::String(s)) => {
                s.trim().parse::<f64>().map_or(Self::String(s), Self::Float)
            }
            (ColumnType::Date, Self::String(s)) => parse_date(&s).unwrap_or(Self::String(s)),
            (ColumnType::Date, Self::DateTime(dt)) => Self::Date(dt.date()),
            (ColumnType::Date, Self::DateTimeTz(dt)) => Self::Date(dt.date_naive()),
            (ColumnType::DateTime, Self::String(s)) => {
                parse_datetime(&s).unwrap_or(Self::String(s))
            }
            (ColumnType::Time, Self::String(s)) => {
                chrono::NaiveTime::parse_from_str(&s, "%H:%M:%S%.f")
                    .map_or(Self::String(s), Self::Time)
            }
            (ColumnType::Json, Self::String(s)) => {
                serde_json::from_str(&s).map_or(Self::String(s), Self::Json)
            }
            (ColumnType::Uuid, Self::String(s)) => {
                uuid::Uuid::parse_str(&s).map_or(Self::String(s), Self::Uuid)
            }
            (ColumnType::Uuid, Self::Bytes(b)) => {
                uuid::Uuid::from_slice(&b).map_or(Self::Bytes(b), Self::Uuid)
            }
            (ColumnType::Binary, Self::String(s)) => Self::Bytes(s.into_bytes()),
            (_, other) => other,
        }
    }
}

fn parse_date(s: &str) -> Option<Value> {
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(Value::Date)
        .or_else(|| match parse_datetime(s) {
            Some(Value::DateTime(dt)) => Some(Value::Date(dt.date())),
            Some(Value::DateTimeTz(dt)) => Some(Value::Date(dt.date_naive())),
            _ => None,
        })
}

fn parse_datetime(s: &str) -> Option<Value> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(Value::DateTimeTz(dt.with_timezone(&chrono::Utc)));
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| chrono::NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(Value::DateTime)
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(Value::DateTime)
        })
}

/// An ordered set of column/value pairs, as written by insert and update.
///
/// Setting a column twice replaces the earlier value in place.
///
/// # Examples
///
/// ```
/// use oqb_db::value::{Record, Value};
///
/// let mut record = Record::new();
/// record.set("name", "Jordan");
/// record.set("id", 1_i64);
/// record.set("name", "Madelyn");
/// assert_eq!(record.len(), 2);
/// assert_eq!(record.get("name"), Some(&Value::from("Madelyn")));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Creates an empty record.
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Sets a column value, replacing any earlier value for that column.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((column, value)),
        }
    }

    /// Builder form of [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Returns the value for a column.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Returns `true` if the record holds a value for the column.
    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// Iterates over the column names in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Iterates over `(column, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Returns the number of columns set.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if no column is set.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Consumes the record, returning its pairs.
    pub fn into_fields(self) -> Vec<(String, Value)> {
        self.fields
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (column, value) in iter {
            record.set(column, value);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_primitives() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(42_i32), Value::Int(42));
        assert_eq!(Value::from(1.5_f64), Value::Float(1.5));
        assert_eq!(Value::from("a"), Value::String("a".into()));
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(Some(3_i64)), Value::Int(3));
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn test_display_list() {
        let list = Value::List(vec![Value::Int(1), Value::Null, Value::from("x")]);
        assert_eq!(list.to_string(), "[1, NULL, x]");
    }

    #[test]
    fn test_from_json_numbers() {
        assert_eq!(Value::from_json(&serde_json::json!(3)), Value::Int(3));
        assert_eq!(Value::from_json(&serde_json::json!(2.5)), Value::Float(2.5));
        assert_eq!(Value::from_json(&serde_json::json!(null)), Value::Null);
    }

    #[test]
    fn test_from_json_array_and_object() {
        assert_eq!(
            Value::from_json(&serde_json::json!([1, "a"])),
            Value::List(vec![Value::Int(1), Value::from("a")])
        );
        let obj = serde_json::json!({"k": 1});
        assert_eq!(Value::from_json(&obj), Value::Json(obj));
    }

    #[test]
    fn test_to_json_dates() {
        let d = chrono::NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();
        assert_eq!(Value::Date(d).to_json(), serde_json::json!("2018-01-01"));
        let dt = d.and_hms_opt(10, 5, 0).unwrap();
        assert_eq!(Value::DateTime(dt).to_json(), serde_json::json!("2018-01-01T10:05:00"));
    }

    #[test]
    fn test_to_json_bytes_and_nan() {
        assert_eq!(Value::Bytes(vec![1, 2]).to_json(), serde_json::json!([1, 2]));
        assert_eq!(Value::Float(f64::NAN).to_json(), serde_json::Value::Null);
    }

    #[test]
    fn test_coerce_boolean_from_int() {
        assert_eq!(Value::Int(1).coerce(ColumnType::Boolean), Value::Bool(true));
        assert_eq!(Value::Int(0).coerce(ColumnType::Boolean), Value::Bool(false));
    }

    #[test]
    fn test_coerce_datetime_from_sqlite_text() {
        let v = Value::from("2018-01-01 00:00:00").coerce(ColumnType::DateTime);
        let expected = chrono::NaiveDate::from_ymd_opt(2018, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(v, Value::DateTime(expected));
    }

    #[test]
    fn test_coerce_datetime_rfc3339() {
        let v = Value::from("2018-01-01T00:00:00Z").coerce(ColumnType::DateTime);
        assert!(matches!(v, Value::DateTimeTz(_)));
    }

    #[test]
    fn test_coerce_date_and_json() {
        let v = Value::from("2020-02-29").coerce(ColumnType::Date);
        assert_eq!(v, Value::Date(chrono::NaiveDate::from_ymd_opt(2020, 2, 29).unwrap()));
        let j = Value::from("{\"a\":1}").coerce(ColumnType::Json);
        assert_eq!(j, Value::Json(serde_json::json!({"a": 1})));
    }

    #[test]
    fn test_coerce_unconvertible_is_unchanged() {
        assert_eq!(
            Value::from("abc").coerce(ColumnType::Integer),
            Value::from("abc")
        );
        assert_eq!(Value::Null.coerce(ColumnType::Integer), Value::Null);
        assert_eq!(Value::Int(5).coerce(ColumnType::String), Value::Int(5));
    }

    #[test]
    fn test_record_set_replaces_in_place() {
        let mut r = Record::new();
        r.set("a", 1_i64);
        r.set("b", 2_i64);
        r.set("a", 3_i64);
        let cols: Vec<&str> = r.columns().collect();
        assert_eq!(cols, vec!["a", "b"]);
        assert_eq!(r.get("a"), Some(&Value::Int(3)));
        assert!(!r.contains("c"));
    }

    #[test]
    fn test_record_from_iter() {
        let r: Record = vec![("id", Value::Int(1)), ("name", Value::from("x"))]
            .into_iter()
            .collect();
        assert_eq!(r.len(), 2);
        assert_eq!(r.into_fields()[1].0, "name");
    }
}
