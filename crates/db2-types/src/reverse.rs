//! Reverse conversion: DB2 value → JSON value
//!
//! Used by the iterator to turn source and tracking-table rows into record
//! payloads. Output formats are chosen so that [`crate::forward`] accepts
//! them again unchanged.

use crate::error::ConversionError;
use crate::forward::{parse_bool, parse_date, parse_decimal, parse_time, parse_timestamp};
use crate::schema::Db2Type;
use crate::value::Db2Value;
use base64::Engine;
use serde_json::Value;

/// Convert a DB2 value to JSON.
///
/// DECIMAL and DECFLOAT become strings to keep their exact precision; binary
/// data becomes standard base64.
pub fn db2_to_json(value: &Db2Value) -> Value {
    match value {
        Db2Value::Null => Value::Null,
        Db2Value::Bool(b) => Value::Bool(*b),
        Db2Value::SmallInt(v) => Value::from(*v),
        Db2Value::Integer(v) => Value::from(*v),
        Db2Value::BigInt(v) => Value::from(*v),
        // Go through the shortest decimal form so 0.1f32 stays 0.1
        Db2Value::Real(v) => v
            .to_string()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Db2Value::Double(v) => serde_json::Number::from_f64(*v)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Db2Value::Decimal(d) => Value::String(d.to_string()),
        Db2Value::Text(s) => Value::String(s.clone()),
        Db2Value::Bytes(b) => Value::String(base64::engine::general_purpose::STANDARD.encode(b)),
        Db2Value::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        Db2Value::Time(t) => Value::String(t.format("%H:%M:%S%.f").to_string()),
        Db2Value::Timestamp(ts) => Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
    }
}

/// Interpret a column value fetched in character form.
///
/// Drivers that hand back every column as text (the ODBC backend does) use
/// this to recover the typed value from the declared column type. `None`
/// is SQL NULL.
pub fn parse_text(text: Option<&str>, ty: &Db2Type) -> Result<Db2Value, ConversionError> {
    let Some(text) = text else {
        return Ok(Db2Value::Null);
    };

    let mismatch = || ConversionError::TypeMismatch {
        column_type: ty.to_string(),
        value: text.to_string(),
    };
    let temporal = || ConversionError::InvalidTemporal {
        column_type: ty.to_string(),
        value: text.to_string(),
    };

    match ty {
        Db2Type::SmallInt => text.trim().parse().map(Db2Value::SmallInt).map_err(|_| mismatch()),
        Db2Type::Integer => text.trim().parse().map(Db2Value::Integer).map_err(|_| mismatch()),
        Db2Type::BigInt => text.trim().parse().map(Db2Value::BigInt).map_err(|_| mismatch()),
        Db2Type::Real => text.trim().parse().map(Db2Value::Real).map_err(|_| mismatch()),
        Db2Type::Double => text.trim().parse().map(Db2Value::Double).map_err(|_| mismatch()),
        Db2Type::Decimal { .. } | Db2Type::DecFloat => {
            parse_decimal(text.trim()).map(Db2Value::Decimal)
        }
        Db2Type::Boolean => parse_bool(text).map(Db2Value::Bool).ok_or_else(mismatch),
        Db2Type::Date => parse_date(text).map(Db2Value::Date).ok_or_else(temporal),
        Db2Type::Time => parse_time(text).map(Db2Value::Time).ok_or_else(temporal),
        Db2Type::Timestamp => parse_timestamp(text)
            .map(Db2Value::Timestamp)
            .ok_or_else(temporal),
        Db2Type::Binary { .. } | Db2Type::VarBinary { .. } | Db2Type::Blob => {
            decode_hex(text.trim()).map(Db2Value::Bytes).ok_or_else(|| {
                ConversionError::InvalidBinary(format!("expected hex digits, got '{text}'"))
            })
        }
        Db2Type::Char { .. }
        | Db2Type::VarChar { .. }
        | Db2Type::Clob
        | Db2Type::Graphic { .. }
        | Db2Type::VarGraphic { .. }
        | Db2Type::DbClob
        | Db2Type::Xml
        | Db2Type::Other(_) => Ok(Db2Value::Text(text.to_string())),
    }
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| text.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::json_to_db2;
    use chrono::{NaiveDate, NaiveTime};
    use rust_decimal::Decimal;
    use serde_json::json;

    #[test]
    fn test_scalars_to_json() {
        assert_eq!(db2_to_json(&Db2Value::Null), Value::Null);
        assert_eq!(db2_to_json(&Db2Value::Integer(7)), json!(7));
        assert_eq!(db2_to_json(&Db2Value::Real(0.1)), json!(0.1));
        assert_eq!(db2_to_json(&Db2Value::Double(f64::NAN)), Value::Null);
        assert_eq!(
            db2_to_json(&Db2Value::Decimal(Decimal::new(1050, 2))),
            json!("10.50")
        );
        assert_eq!(db2_to_json(&Db2Value::Bytes(vec![1, 2, 3])), json!("AQID"));
    }

    #[test]
    fn test_temporal_to_json() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(
            db2_to_json(&Db2Value::Timestamp(ts)),
            json!("2024-03-01T10:30:00")
        );
        assert_eq!(
            db2_to_json(&Db2Value::Time(NaiveTime::from_hms_opt(8, 5, 9).unwrap())),
            json!("08:05:09")
        );
    }

    #[test]
    fn test_json_output_is_accepted_by_forward_conversion() {
        let cases = [
            (Db2Type::Integer, Db2Value::Integer(12)),
            (
                Db2Type::Decimal {
                    precision: 10,
                    scale: 2,
                },
                Db2Value::Decimal(Decimal::new(1999, 2)),
            ),
            (
                Db2Type::Date,
                Db2Value::Date(NaiveDate::from_ymd_opt(2001, 2, 3).unwrap()),
            ),
            (Db2Type::Blob, Db2Value::Bytes(vec![0, 255, 16])),
            (
                Db2Type::VarChar { length: 10 },
                Db2Value::Text("hello".to_string()),
            ),
        ];
        for (ty, value) in cases {
            assert_eq!(json_to_db2(&db2_to_json(&value), &ty).unwrap(), value);
        }
    }

    #[test]
    fn test_parse_text() {
        assert_eq!(parse_text(None, &Db2Type::Integer).unwrap(), Db2Value::Null);
        assert_eq!(
            parse_text(Some(" 15"), &Db2Type::Integer).unwrap(),
            Db2Value::Integer(15)
        );
        assert_eq!(
            parse_text(Some("2024-01-02-03.04.05.000000"), &Db2Type::Timestamp).unwrap(),
            Db2Value::Timestamp(
                NaiveDate::from_ymd_opt(2024, 1, 2)
                    .unwrap()
                    .and_hms_opt(3, 4, 5)
                    .unwrap()
            )
        );
        assert_eq!(
            parse_text(Some("0AFF"), &Db2Type::VarBinary { length: 2 }).unwrap(),
            Db2Value::Bytes(vec![0x0a, 0xff])
        );
        assert_eq!(
            parse_text(Some("ABC  "), &Db2Type::Char { length: 5 }).unwrap(),
            Db2Value::Text("ABC  ".to_string())
        );
        assert!(parse_text(Some("x"), &Db2Type::BigInt).is_err());
        assert!(parse_text(Some("0AF"), &Db2Type::Blob).is_err());
    }
}
