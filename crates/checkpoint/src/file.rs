//! Checkpoint file wrapper for storage-agnostic serialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Checkpoint, SyncPhase};

/// Self-describing checkpoint envelope.
///
/// # File Format
///
/// ```json
/// {
///     "database_type": "db2",
///     "table": "CLIENTS",
///     "checkpoint": { "mode": "cdc", "cdc_last_id": 42, "created_at": "2024-01-01T00:00:00Z" },
///     "phase": "cdc",
///     "created_at": "2024-01-01T00:00:00Z"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointFile {
    /// Source type identifier (e.g., "db2")
    pub database_type: String,
    /// Source table the checkpoint belongs to
    pub table: String,
    /// Serialized checkpoint data as JSON Value
    pub checkpoint: serde_json::Value,
    /// Phase when this checkpoint was created
    pub phase: SyncPhase,
    pub created_at: DateTime<Utc>,
}

impl CheckpointFile {
    pub fn new<C: Checkpoint>(
        checkpoint: &C,
        table: &str,
        phase: SyncPhase,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            database_type: C::DATABASE_TYPE.to_string(),
            table: table.to_string(),
            checkpoint: serde_json::to_value(checkpoint)?,
            phase,
            created_at: Utc::now(),
        })
    }

    /// Parse checkpoint into the source-specific type.
    ///
    /// Fails if the stored `database_type` is not `C::DATABASE_TYPE`.
    pub fn parse<C: Checkpoint>(&self) -> anyhow::Result<C> {
        if self.database_type != C::DATABASE_TYPE {
            anyhow::bail!(
                "Checkpoint type mismatch: expected '{}', found '{}'",
                C::DATABASE_TYPE,
                self.database_type
            );
        }
        Ok(serde_json::from_value(self.checkpoint.clone())?)
    }

    pub fn database_type(&self) -> &str {
        &self.database_type
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }
}
