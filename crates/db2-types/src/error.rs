//! Error types for db2-types crate.

use thiserror::Error;

/// Errors that can occur while converting between JSON and DB2 values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConversionError {
    /// The JSON value cannot represent the target column type
    #[error("Type mismatch for {column_type}: cannot convert {value}")]
    TypeMismatch { column_type: String, value: String },

    /// The value does not fit the target integer type
    #[error("Value {value} out of range for {column_type}")]
    OutOfRange { column_type: String, value: String },

    /// A date, time or timestamp string could not be parsed
    #[error("Invalid {column_type} literal: '{value}'")]
    InvalidTemporal { column_type: String, value: String },

    /// A decimal string could not be parsed
    #[error("Invalid decimal: {0}")]
    InvalidDecimal(String),

    /// Binary data was not valid base64
    #[error("Invalid base64 binary data: {0}")]
    InvalidBinary(String),

    /// Conversion of a specific column failed
    #[error("Column '{column}': {source}")]
    InColumn {
        column: String,
        #[source]
        source: Box<ConversionError>,
    },

    /// The type name is not a recognizable DB2 type declaration
    #[error("Invalid DB2 type declaration: '{0}'")]
    InvalidTypeName(String),
}
