//! Values exchanged with DB2 statements.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt;

/// A single DB2 value, used both for bound parameters and result columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Db2Value {
    Null,
    Bool(bool),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Real(f32),
    Double(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

impl Db2Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Db2Value::Null)
    }

    /// Integer view of the value, used for identity and count columns.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Db2Value::SmallInt(v) => Some(i64::from(*v)),
            Db2Value::Integer(v) => Some(i64::from(*v)),
            Db2Value::BigInt(v) => Some(*v),
            Db2Value::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            Db2Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Db2Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Text form used when binding the value as a character parameter.
    ///
    /// Returns `None` for NULL. Binary values are rendered as upper-case hex.
    pub fn to_sql_text(&self) -> Option<String> {
        match self {
            Db2Value::Null => None,
            Db2Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            Db2Value::SmallInt(v) => Some(v.to_string()),
            Db2Value::Integer(v) => Some(v.to_string()),
            Db2Value::BigInt(v) => Some(v.to_string()),
            Db2Value::Real(v) => Some(v.to_string()),
            Db2Value::Double(v) => Some(v.to_string()),
            Db2Value::Decimal(d) => Some(d.to_string()),
            Db2Value::Text(s) => Some(s.clone()),
            Db2Value::Bytes(b) => Some(b.iter().map(|byte| format!("{byte:02X}")).collect()),
            Db2Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Db2Value::Time(t) => Some(t.format("%H:%M:%S").to_string()),
            Db2Value::Timestamp(ts) => Some(ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
        }
    }
}

impl fmt::Display for Db2Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_sql_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("NULL"),
        }
    }
}

impl From<i64> for Db2Value {
    fn from(v: i64) -> Self {
        Db2Value::BigInt(v)
    }
}

impl From<i32> for Db2Value {
    fn from(v: i32) -> Self {
        Db2Value::Integer(v)
    }
}

impl From<&str> for Db2Value {
    fn from(v: &str) -> Self {
        Db2Value::Text(v.to_string())
    }
}

impl From<String> for Db2Value {
    fn from(v: String) -> Self {
        Db2Value::Text(v)
    }
}

/// One result row: column names paired with values, in select-list order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Db2Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion, mostly for tests and fakes.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Db2Value>) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Db2Value>) {
        self.columns.push((column.into(), value.into()));
    }

    /// Look up a column by name. DB2 folds unquoted names to upper case, so
    /// the lookup falls back to a case-insensitive match.
    pub fn get(&self, column: &str) -> Option<&Db2Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .or_else(|| {
                self.columns
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(column))
            })
            .map(|(_, value)| value)
    }

    /// First column, for single-value queries such as `count(*)` or `max(...)`.
    pub fn scalar(&self) -> Option<&Db2Value> {
        self.columns.first().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Db2Value)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl FromIterator<(String, Db2Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Db2Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}
