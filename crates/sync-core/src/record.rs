//! Change record representation shared by the source and destination sides.
//!
//! A [`ChangeRecord`] is produced once by the iterator from a single source or
//! tracking-table row and consumed once by the writer. Records are never
//! mutated after construction.

use crate::position::Position;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Column name to JSON value mapping.
///
/// A `BTreeMap` keeps column order deterministic, which in turn keeps the
/// generated MERGE statements stable for identical inputs.
pub type StructuredData = BTreeMap<String, serde_json::Value>;

/// Key or payload data attached to a record.
///
/// Records coming from the iterator are always structured. Records arriving
/// from an external pipeline may carry raw bytes that are expected to hold a
/// JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Data {
    /// Already structured column/value mapping
    Structured(StructuredData),
    /// Raw bytes holding a JSON object
    Raw(Vec<u8>),
}

impl Data {
    /// Parse the data into a column/value mapping.
    ///
    /// Returns `Ok(None)` when there is nothing to parse (empty bytes or an
    /// empty mapping) and an error when raw bytes are not a JSON object.
    pub fn structurize(&self) -> Result<Option<StructuredData>, serde_json::Error> {
        match self {
            Data::Structured(map) if map.is_empty() => Ok(None),
            Data::Structured(map) => Ok(Some(map.clone())),
            Data::Raw(bytes) if bytes.is_empty() => Ok(None),
            Data::Raw(bytes) => {
                let map: StructuredData = serde_json::from_slice(bytes)?;
                if map.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(map))
                }
            }
        }
    }
}

impl From<StructuredData> for Data {
    fn from(map: StructuredData) -> Self {
        Data::Structured(map)
    }
}

/// Kind of change a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Existing row read during the snapshot phase
    Snapshot,
    /// Row inserted on the source table
    Create,
    /// Row updated on the source table
    Update,
    /// Row deleted from the source table
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Snapshot => "snapshot",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the writer should do with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Insert-or-update by key
    Upsert,
    /// Delete by key
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Upsert => "upsert",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    /// `"delete"` routes to delete, every other action string routes to upsert.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delete" => Ok(Action::Delete),
            _ => Ok(Action::Upsert),
        }
    }
}

/// Typed per-record routing information.
///
/// Unknown fields are rejected on deserialization so that a misspelled
/// routing key fails loudly instead of being ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordMetadata {
    /// Destination table override; the writer's configured table is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Action override; derived from the record operation when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
}

impl RecordMetadata {
    pub fn new(table: impl Into<String>, action: Action) -> Self {
        Self {
            table: Some(table.into()),
            action: Some(action),
        }
    }
}

/// Before/after images of a row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Data>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Data>,
}

/// A single change event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Iterator position right after this record; absent for externally built records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    pub operation: Operation,
    #[serde(default)]
    pub metadata: RecordMetadata,
    /// Key mapping with at most one entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Data>,
    #[serde(default)]
    pub payload: Payload,
    pub created_at: DateTime<Utc>,
}

impl ChangeRecord {
    /// Build a record for a row image.
    ///
    /// `after` holds the new row image for snapshot/create/update records and
    /// the pre-change row image for delete records. The metadata carries no
    /// table, so the writer applies the record to its own configured table.
    pub fn new(
        operation: Operation,
        position: Position,
        key: StructuredData,
        after: StructuredData,
    ) -> Self {
        let action = match operation {
            Operation::Delete => Action::Delete,
            _ => Action::Upsert,
        };

        Self {
            position: Some(position),
            operation,
            metadata: RecordMetadata {
                table: None,
                action: Some(action),
            },
            key: if key.is_empty() {
                None
            } else {
                Some(Data::Structured(key))
            },
            payload: Payload {
                before: None,
                after: Some(Data::Structured(after)),
            },
            created_at: Utc::now(),
        }
    }

    /// Resolve the writer action for this record.
    ///
    /// An explicit metadata action wins; otherwise delete operations route to
    /// delete and everything else to upsert.
    pub fn action(&self) -> Action {
        match self.metadata.action {
            Some(action) => action,
            None if self.operation == Operation::Delete => Action::Delete,
            None => Action::Upsert,
        }
    }
}
