//! DB2 type model and value conversions for db2-sync.
//!
//! # Modules
//!
//! - [`schema`] - DB2 column types as reported by `SYSCAT.COLUMNS`
//! - [`value`] - Values bound to and read from DB2 statements
//! - [`forward`] - JSON value → DB2 value conversion (writer side)
//! - [`reverse`] - DB2 value → JSON value conversion (iterator side)
//!
//! # Example
//!
//! ```
//! use db2_types::{json_to_db2, Db2Type, Db2Value};
//! use serde_json::json;
//!
//! let ty: Db2Type = "VARCHAR(20)".parse().unwrap();
//! let value = json_to_db2(&json!("Alice"), &ty).unwrap();
//! assert_eq!(value, Db2Value::Text("Alice".to_string()));
//! ```

pub mod error;
pub mod forward;
pub mod reverse;
pub mod schema;
pub mod value;

pub use error::ConversionError;
pub use forward::{convert_structured, json_to_db2, json_to_db2_untyped};
pub use reverse::{db2_to_json, parse_text};
pub use schema::{ColumnTypes, Db2Type};
pub use value::{Db2Value, Row};
