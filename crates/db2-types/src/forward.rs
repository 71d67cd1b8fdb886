//! Forward conversion: JSON value → DB2 value
//!
//! Record payloads carry loosely typed JSON. Before they are bound to a
//! MERGE statement every value is converted against the declared type of
//! its destination column, so that e.g. `"42"` lands in an INTEGER column as
//! an integer and an RFC 3339 string lands in a TIMESTAMP column as a
//! timestamp.

use crate::error::ConversionError;
use crate::schema::{ColumnTypes, Db2Type};
use crate::value::Db2Value;
use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Convert a JSON value into a value for a column of type `ty`.
pub fn json_to_db2(value: &Value, ty: &Db2Type) -> Result<Db2Value, ConversionError> {
    if value.is_null() {
        return Ok(Db2Value::Null);
    }

    match ty {
        Db2Type::SmallInt => {
            let i = json_to_i64(value, ty)?;
            i16::try_from(i)
                .map(Db2Value::SmallInt)
                .map_err(|_| out_of_range(ty, i))
        }
        Db2Type::Integer => {
            let i = json_to_i64(value, ty)?;
            i32::try_from(i)
                .map(Db2Value::Integer)
                .map_err(|_| out_of_range(ty, i))
        }
        Db2Type::BigInt => json_to_i64(value, ty).map(Db2Value::BigInt),

        Db2Type::Real => json_to_f64(value, ty).map(|f| Db2Value::Real(f as f32)),
        Db2Type::Double => json_to_f64(value, ty).map(Db2Value::Double),

        Db2Type::Decimal { .. } | Db2Type::DecFloat => {
            let text = match value {
                Value::Number(n) => n.to_string(),
                Value::String(s) => s.trim().to_string(),
                other => return Err(mismatch(ty, other)),
            };
            parse_decimal(&text).map(Db2Value::Decimal)
        }

        Db2Type::Boolean => match value {
            Value::Bool(b) => Ok(Db2Value::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(0) => Ok(Db2Value::Bool(false)),
                Some(1) => Ok(Db2Value::Bool(true)),
                _ => Err(mismatch(ty, value)),
            },
            Value::String(s) => parse_bool(s).map(Db2Value::Bool).ok_or_else(|| mismatch(ty, value)),
            other => Err(mismatch(ty, other)),
        },

        Db2Type::Date => match value {
            Value::String(s) => parse_date(s)
                .map(Db2Value::Date)
                .ok_or_else(|| invalid_temporal(ty, s)),
            other => Err(mismatch(ty, other)),
        },
        Db2Type::Time => match value {
            Value::String(s) => parse_time(s)
                .map(Db2Value::Time)
                .ok_or_else(|| invalid_temporal(ty, s)),
            other => Err(mismatch(ty, other)),
        },
        Db2Type::Timestamp => match value {
            Value::String(s) => parse_timestamp(s)
                .map(Db2Value::Timestamp)
                .ok_or_else(|| invalid_temporal(ty, s)),
            other => Err(mismatch(ty, other)),
        },

        Db2Type::Binary { .. } | Db2Type::VarBinary { .. } | Db2Type::Blob => match value {
            Value::String(s) => base64::engine::general_purpose::STANDARD
                .decode(s)
                .map(Db2Value::Bytes)
                .map_err(|e| ConversionError::InvalidBinary(e.to_string())),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|b| u8::try_from(b).ok())
                        .ok_or_else(|| mismatch(ty, value))
                })
                .collect::<Result<Vec<u8>, _>>()
                .map(Db2Value::Bytes),
            other => Err(mismatch(ty, other)),
        },

        Db2Type::Char { .. }
        | Db2Type::VarChar { .. }
        | Db2Type::Clob
        | Db2Type::Graphic { .. }
        | Db2Type::VarGraphic { .. }
        | Db2Type::DbClob
        | Db2Type::Xml
        | Db2Type::Other(_) => Ok(Db2Value::Text(json_to_text(value))),
    }
}

/// Convert a JSON value for a column whose type is unknown.
pub fn json_to_db2_untyped(value: &Value) -> Db2Value {
    match value {
        Value::Null => Db2Value::Null,
        Value::Bool(b) => Db2Value::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Db2Value::BigInt(i),
            None => Db2Value::Double(n.as_f64().unwrap_or_default()),
        },
        other => Db2Value::Text(json_to_text(other)),
    }
}

/// Convert every value of a structured payload against the column types.
///
/// Columns missing from `types` are converted untyped. Type lookup falls back
/// to a case-insensitive match because payload keys are not always folded to
/// upper case the way DB2 stores unquoted names.
pub fn convert_structured(
    data: &BTreeMap<String, Value>,
    types: &ColumnTypes,
) -> Result<BTreeMap<String, Db2Value>, ConversionError> {
    data.iter()
        .map(|(column, value)| {
            let converted = match lookup_type(types, column) {
                Some(ty) => json_to_db2(value, ty).map_err(|e| ConversionError::InColumn {
                    column: column.clone(),
                    source: Box::new(e),
                })?,
                None => json_to_db2_untyped(value),
            };
            Ok((column.clone(), converted))
        })
        .collect()
}

fn lookup_type<'a>(types: &'a ColumnTypes, column: &str) -> Option<&'a Db2Type> {
    types.get(column).or_else(|| {
        types
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, ty)| ty)
    })
}

fn json_to_i64(value: &Value, ty: &Db2Type) -> Result<i64, ConversionError> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                    Ok(f as i64)
                }
                _ => Err(out_of_range(ty, n)),
            }
        }
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| mismatch(ty, value)),
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(mismatch(ty, other)),
    }
}

fn json_to_f64(value: &Value, ty: &Db2Type) -> Result<f64, ConversionError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| mismatch(ty, value)),
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| mismatch(ty, value)),
        other => Err(mismatch(ty, other)),
    }
}

fn json_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn parse_decimal(text: &str) -> Result<Decimal, ConversionError> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map_err(|_| ConversionError::InvalidDecimal(text.to_string()))
}

pub(crate) fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "t" | "y" | "yes" => Some(true),
        "false" | "0" | "f" | "n" | "no" => Some(false),
        _ => None,
    }
}

pub(crate) fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(text).map(|ts| ts.date()))
}

pub(crate) fn parse_time(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H.%M.%S"))
        .ok()
}

/// Accepts RFC 3339, ISO 8601 without offset, the space separated ODBC
/// form, and DB2's own `YYYY-MM-DD-HH.MM.SS.ffffff` form.
pub(crate) fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d-%H.%M.%S%.f",
    ] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn mismatch(ty: &Db2Type, value: &Value) -> ConversionError {
    ConversionError::TypeMismatch {
        column_type: ty.to_string(),
        value: value.to_string(),
    }
}

fn out_of_range(ty: &Db2Type, value: impl ToString) -> ConversionError {
    ConversionError::OutOfRange {
        column_type: ty.to_string(),
        value: value.to_string(),
    }
}

fn invalid_temporal(ty: &Db2Type, value: &str) -> ConversionError {
    ConversionError::InvalidTemporal {
        column_type: ty.to_string(),
        value: value.to_string(),
    }
}
