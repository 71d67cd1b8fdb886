//! DB2 column types.
//!
//! Types are read from the catalog (`SYSCAT.COLUMNS.TYPENAME`, `LENGTH`,
//! `SCALE`) or parsed from a declaration such as `DECIMAL(10,2)`.

use crate::error::ConversionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Column name → declared type, in sorted column-name order.
pub type ColumnTypes = BTreeMap<String, Db2Type>;

/// Declared type of a DB2 column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Db2Type {
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal { precision: u8, scale: u8 },
    DecFloat,
    Boolean,
    Char { length: u32 },
    VarChar { length: u32 },
    Clob,
    Graphic { length: u32 },
    VarGraphic { length: u32 },
    DbClob,
    Binary { length: u32 },
    VarBinary { length: u32 },
    Blob,
    Date,
    Time,
    Timestamp,
    Xml,
    /// Anything else; values are passed through as text
    Other(String),
}

impl Db2Type {
    /// Map a `SYSCAT.COLUMNS` row to a type.
    ///
    /// For DECIMAL the catalog reports the precision in `LENGTH`.
    ///
    /// ```
    /// use db2_types::Db2Type;
    ///
    /// assert_eq!(Db2Type::from_catalog("INTEGER", 4, 0), Db2Type::Integer);
    /// assert_eq!(
    ///     Db2Type::from_catalog("DECIMAL", 10, 2),
    ///     Db2Type::Decimal { precision: 10, scale: 2 }
    /// );
    /// ```
    pub fn from_catalog(type_name: &str, length: i64, scale: i64) -> Self {
        let length_u32 = u32::try_from(length.max(0)).unwrap_or(u32::MAX);
        match type_name.trim().to_uppercase().as_str() {
            "SMALLINT" => Db2Type::SmallInt,
            "INTEGER" | "INT" => Db2Type::Integer,
            "BIGINT" => Db2Type::BigInt,
            "REAL" => Db2Type::Real,
            "DOUBLE" | "FLOAT" => Db2Type::Double,
            "DECIMAL" | "NUMERIC" => Db2Type::Decimal {
                precision: length.clamp(1, 31) as u8,
                scale: scale.clamp(0, 31) as u8,
            },
            "DECFLOAT" => Db2Type::DecFloat,
            "BOOLEAN" => Db2Type::Boolean,
            "CHARACTER" | "CHAR" => Db2Type::Char {
                length: length_u32,
            },
            "VARCHAR" | "LONG VARCHAR" => Db2Type::VarChar {
                length: length_u32,
            },
            "CLOB" => Db2Type::Clob,
            "GRAPHIC" => Db2Type::Graphic {
                length: length_u32,
            },
            "VARGRAPHIC" | "LONG VARGRAPHIC" => Db2Type::VarGraphic {
                length: length_u32,
            },
            "DBCLOB" => Db2Type::DbClob,
            "BINARY" => Db2Type::Binary {
                length: length_u32,
            },
            "VARBINARY" => Db2Type::VarBinary {
                length: length_u32,
            },
            "BLOB" => Db2Type::Blob,
            "DATE" => Db2Type::Date,
            "TIME" => Db2Type::Time,
            "TIMESTAMP" => Db2Type::Timestamp,
            "XML" => Db2Type::Xml,
            other => Db2Type::Other(other.to_string()),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Db2Type::SmallInt | Db2Type::Integer | Db2Type::BigInt)
    }

    pub fn is_binary(&self) -> bool {
        matches!(
            self,
            Db2Type::Binary { .. } | Db2Type::VarBinary { .. } | Db2Type::Blob
        )
    }
}

impl fmt::Display for Db2Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Db2Type::SmallInt => write!(f, "SMALLINT"),
            Db2Type::Integer => write!(f, "INTEGER"),
            Db2Type::BigInt => write!(f, "BIGINT"),
            Db2Type::Real => write!(f, "REAL"),
            Db2Type::Double => write!(f, "DOUBLE"),
            Db2Type::Decimal { precision, scale } => write!(f, "DECIMAL({precision},{scale})"),
            Db2Type::DecFloat => write!(f, "DECFLOAT"),
            Db2Type::Boolean => write!(f, "BOOLEAN"),
            Db2Type::Char { length } => write!(f, "CHAR({length})"),
            Db2Type::VarChar { length } => write!(f, "VARCHAR({length})"),
            Db2Type::Clob => write!(f, "CLOB"),
            Db2Type::Graphic { length } => write!(f, "GRAPHIC({length})"),
            Db2Type::VarGraphic { length } => write!(f, "VARGRAPHIC({length})"),
            Db2Type::DbClob => write!(f, "DBCLOB"),
            Db2Type::Binary { length } => write!(f, "BINARY({length})"),
            Db2Type::VarBinary { length } => write!(f, "VARBINARY({length})"),
            Db2Type::Blob => write!(f, "BLOB"),
            Db2Type::Date => write!(f, "DATE"),
            Db2Type::Time => write!(f, "TIME"),
            Db2Type::Timestamp => write!(f, "TIMESTAMP"),
            Db2Type::Xml => write!(f, "XML"),
            Db2Type::Other(name) => write!(f, "{name}"),
        }
    }
}

impl FromStr for Db2Type {
    type Err = ConversionError;

    /// Parse a column declaration such as `INTEGER`, `VARCHAR(20)` or
    /// `DECIMAL(10,2)`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConversionError::InvalidTypeName(s.to_string());
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let (name, args) = match trimmed.find('(') {
            Some(open) => {
                let close = trimmed.rfind(')').ok_or_else(invalid)?;
                if close < open || close != trimmed.len() - 1 {
                    return Err(invalid());
                }
                let args = trimmed[open + 1..close]
                    .split(',')
                    .map(|a| a.trim().parse::<i64>().map_err(|_| invalid()))
                    .collect::<Result<Vec<_>, _>>()?;
                (trimmed[..open].trim(), args)
            }
            None => (trimmed, Vec::new()),
        };

        let upper = name.to_uppercase();
        let first = args.first().copied();
        let second = args.get(1).copied();

        let ty = match upper.as_str() {
            "DECIMAL" | "DEC" | "NUMERIC" => {
                Db2Type::from_catalog("DECIMAL", first.unwrap_or(5), second.unwrap_or(0))
            }
            "CHAR" | "CHARACTER" | "GRAPHIC" | "BINARY" => {
                Db2Type::from_catalog(&upper, first.unwrap_or(1), 0)
            }
            "VARCHAR" | "VARGRAPHIC" | "VARBINARY" => {
                Db2Type::from_catalog(&upper, first.ok_or_else(invalid)?, 0)
            }
            "DOUBLE PRECISION" => Db2Type::Double,
            _ => Db2Type::from_catalog(&upper, first.unwrap_or(0), second.unwrap_or(0)),
        };
        Ok(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_catalog() {
        assert_eq!(Db2Type::from_catalog("SMALLINT", 2, 0), Db2Type::SmallInt);
        assert_eq!(Db2Type::from_catalog("BIGINT", 8, 0), Db2Type::BigInt);
        assert_eq!(
            Db2Type::from_catalog("VARCHAR", 20, 0),
            Db2Type::VarChar { length: 20 }
        );
        assert_eq!(
            Db2Type::from_catalog("CHARACTER", 3, 0),
            Db2Type::Char { length: 3 }
        );
        assert_eq!(Db2Type::from_catalog("timestamp", 10, 6), Db2Type::Timestamp);
        assert_eq!(
            Db2Type::from_catalog("GEOMETRY", 0, 0),
            Db2Type::Other("GEOMETRY".to_string())
        );
    }

    #[test]
    fn test_parse_declarations() {
        assert_eq!("int".parse::<Db2Type>().unwrap(), Db2Type::Integer);
        assert_eq!(
            "VARCHAR(20)".parse::<Db2Type>().unwrap(),
            Db2Type::VarChar { length: 20 }
        );
        assert_eq!(
            "decimal(10, 2)".parse::<Db2Type>().unwrap(),
            Db2Type::Decimal {
                precision: 10,
                scale: 2
            }
        );
        assert_eq!(
            "DECIMAL".parse::<Db2Type>().unwrap(),
            Db2Type::Decimal {
                precision: 5,
                scale: 0
            }
        );
        assert_eq!(
            "CHAR".parse::<Db2Type>().unwrap(),
            Db2Type::Char { length: 1 }
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("".parse::<Db2Type>().is_err());
        assert!("VARCHAR".parse::<Db2Type>().is_err());
        assert!("VARCHAR(abc)".parse::<Db2Type>().is_err());
        assert!("VARCHAR(10".parse::<Db2Type>().is_err());
        assert!("VARCHAR(10) x".parse::<Db2Type>().is_err());
    }

    #[test]
    fn test_display_roundtrips_through_parse() {
        for ty in [
            Db2Type::Integer,
            Db2Type::VarChar { length: 64 },
            Db2Type::Decimal {
                precision: 12,
                scale: 4,
            },
            Db2Type::Timestamp,
            Db2Type::Blob,
        ] {
            assert_eq!(ty.to_string().parse::<Db2Type>().unwrap(), ty);
        }
    }
}
