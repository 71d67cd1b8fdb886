//! Checkpoint storage trait and types
//!
//! This module defines the CheckpointStore trait for backend-agnostic
//! checkpoint storage operations, plus shared types.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Checkpoint identifier for storage. Each source table owns one slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointID {
    /// Source type (e.g., "db2")
    pub database_type: String,
    /// Source table name
    pub table: String,
}

impl CheckpointID {
    pub fn new(database_type: &str, table: &str) -> Self {
        Self {
            database_type: database_type.to_string(),
            table: table.to_string(),
        }
    }
}

/// Checkpoint data stored in backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCheckpoint {
    /// Serialized checkpoint
    pub checkpoint_data: String,
    /// Source type for validation
    pub database_type: String,
    pub table: String,
    /// Phase string ("snapshot" or "cdc")
    pub phase: String,
    pub created_at: DateTime<Utc>,
}

/// Trait for checkpoint storage operations.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Store a checkpoint, replacing any previous checkpoint with the same id.
    async fn store_checkpoint(&self, id: &CheckpointID, stored: StoredCheckpoint) -> Result<()>;

    /// Read a checkpoint from the storage backend.
    ///
    /// Returns None if the checkpoint doesn't exist.
    async fn read_checkpoint(&self, id: &CheckpointID) -> Result<Option<StoredCheckpoint>>;

    /// Remove a checkpoint. Removing a missing checkpoint is not an error.
    async fn clear_checkpoint(&self, id: &CheckpointID) -> Result<()>;
}

/// In-memory implementation of CheckpointStore.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<CheckpointID, StoredCheckpoint>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<CheckpointID, StoredCheckpoint>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("checkpoint store mutex poisoned"))
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn store_checkpoint(&self, id: &CheckpointID, stored: StoredCheckpoint) -> Result<()> {
        self.lock()?.insert(id.clone(), stored);
        Ok(())
    }

    async fn read_checkpoint(&self, id: &CheckpointID) -> Result<Option<StoredCheckpoint>> {
        Ok(self.lock()?.get(id).cloned())
    }

    async fn clear_checkpoint(&self, id: &CheckpointID) -> Result<()> {
        self.lock()?.remove(id);
        Ok(())
    }
}
