//! Iterator position for resumable reads.
//!
//! The position records which phase the iterator is in and how far it got:
//! - Snapshot: the last processed ordering-column value and the watermark
//!   captured when the snapshot started
//! - CDC: the last tracking-table identity value handed off downstream

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of the combined iterator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IteratorMode {
    /// Reading existing rows of the source table
    Snapshot,
    /// Polling the tracking table
    Cdc,
}

impl IteratorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IteratorMode::Snapshot => "snapshot",
            IteratorMode::Cdc => "cdc",
        }
    }
}

impl std::fmt::Display for IteratorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub mode: IteratorMode,
    /// Ordering-column value of the last row emitted by the snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_last_processed: Option<serde_json::Value>,
    /// Maximum ordering-column value observed when the snapshot started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_max_value: Option<serde_json::Value>,
    /// Last tracking-table identity handed off downstream
    #[serde(default)]
    pub cdc_last_id: i64,
    pub created_at: DateTime<Utc>,
}

impl Position {
    /// Position at the very start of a snapshot bounded by `max_value`.
    ///
    /// `cdc_start` is the last tracking identity recorded before the snapshot
    /// began; CDC picks up after it once the snapshot is done.
    pub fn snapshot_start(max_value: serde_json::Value, cdc_start: i64) -> Self {
        Self {
            mode: IteratorMode::Snapshot,
            snapshot_last_processed: None,
            snapshot_max_value: Some(max_value),
            cdc_last_id: cdc_start,
            created_at: Utc::now(),
        }
    }

    /// Position in the CDC phase after tracking identity `last_id`.
    pub fn cdc(last_id: i64) -> Self {
        Self {
            mode: IteratorMode::Cdc,
            snapshot_last_processed: None,
            snapshot_max_value: None,
            cdc_last_id: last_id,
            created_at: Utc::now(),
        }
    }

    /// Same snapshot watermark, advanced to `value`.
    pub fn with_snapshot_value(&self, value: serde_json::Value) -> Self {
        Self {
            mode: IteratorMode::Snapshot,
            snapshot_last_processed: Some(value),
            snapshot_max_value: self.snapshot_max_value.clone(),
            cdc_last_id: self.cdc_last_id,
            created_at: Utc::now(),
        }
    }

    pub fn is_snapshot(&self) -> bool {
        self.mode == IteratorMode::Snapshot
    }

    /// Serialize to the opaque byte form handed to pipelines.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse the opaque byte form produced by [`Position::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_progression_keeps_watermark() {
        let start = Position::snapshot_start(json!(500), 17);
        assert!(start.is_snapshot());
        assert!(start.snapshot_last_processed.is_none());

        let next = start.with_snapshot_value(json!(42));
        assert_eq!(next.snapshot_last_processed, Some(json!(42)));
        assert_eq!(next.snapshot_max_value, Some(json!(500)));
        assert_eq!(next.mode, IteratorMode::Snapshot);
        assert_eq!(next.cdc_last_id, 17);
    }

    #[test]
    fn test_bytes_roundtrip() {
        let position = Position::cdc(981);
        let bytes = position.to_bytes().unwrap();
        let parsed = Position::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, position);
    }

    #[test]
    fn test_mode_serializes_lowercase() {
        let value = serde_json::to_value(Position::cdc(1)).unwrap();
        assert_eq!(value["mode"], json!("cdc"));
        assert!(value.get("snapshot_max_value").is_none());
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        assert!(Position::from_bytes(b"position-17").is_err());
    }
}
