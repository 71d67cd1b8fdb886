//! Generic sync manager for checkpoint operations.

use crate::{Checkpoint, CheckpointFile, CheckpointID, CheckpointStore, StoredCheckpoint, SyncPhase};
use chrono::Utc;

/// Saves and loads the checkpoint of one source table.
///
/// # Example
///
/// ```rust,ignore
/// use checkpoint::{FilesystemStore, SyncManager, SyncPhase};
///
/// let manager = SyncManager::new(Box::new(FilesystemStore::new(".db2-sync")), "CLIENTS");
/// manager.emit_checkpoint(&position, SyncPhase::Cdc).await?;
/// let resumed: Option<Db2Checkpoint> = manager.read_checkpoint().await?;
/// ```
pub struct SyncManager {
    store: Box<dyn CheckpointStore>,
    table: String,
}

impl SyncManager {
    pub fn new(store: Box<dyn CheckpointStore>, table: &str) -> Self {
        Self {
            store,
            table: table.to_string(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn id<C: Checkpoint>(&self) -> CheckpointID {
        CheckpointID::new(C::DATABASE_TYPE, &self.table)
    }

    /// Persist `checkpoint`, replacing the previous one for this table.
    pub async fn emit_checkpoint<C: Checkpoint>(
        &self,
        checkpoint: &C,
        phase: SyncPhase,
    ) -> anyhow::Result<()> {
        let stored = StoredCheckpoint {
            checkpoint_data: serde_json::to_string(checkpoint)?,
            database_type: C::DATABASE_TYPE.to_string(),
            table: self.table.clone(),
            phase: phase.as_str().to_string(),
            created_at: Utc::now(),
        };
        self.store.store_checkpoint(&self.id::<C>(), stored).await?;

        tracing::debug!(
            "Saved {} checkpoint for table '{}': {}",
            phase,
            self.table,
            checkpoint.to_cli_string()
        );
        Ok(())
    }

    /// Load the stored checkpoint envelope, if any.
    pub async fn read_checkpoint_file<C: Checkpoint>(
        &self,
    ) -> anyhow::Result<Option<CheckpointFile>> {
        let Some(stored) = self.store.read_checkpoint(&self.id::<C>()).await? else {
            return Ok(None);
        };

        Ok(Some(CheckpointFile {
            database_type: stored.database_type,
            table: stored.table,
            checkpoint: serde_json::from_str(&stored.checkpoint_data)?,
            phase: stored.phase.parse()?,
            created_at: stored.created_at,
        }))
    }

    /// Load and parse the stored checkpoint.
    ///
    /// Returns `None` when nothing was stored yet for this table.
    pub async fn read_checkpoint<C: Checkpoint>(&self) -> anyhow::Result<Option<C>> {
        match self.read_checkpoint_file::<C>().await? {
            Some(file) => {
                let checkpoint = file.parse::<C>()?;
                tracing::info!(
                    "Resuming table '{}' from {} checkpoint: {}",
                    self.table,
                    file.phase,
                    checkpoint.to_cli_string()
                );
                Ok(Some(checkpoint))
            }
            None => Ok(None),
        }
    }

    /// Forget the stored checkpoint so the next run starts with a snapshot.
    pub async fn clear_checkpoint<C: Checkpoint>(&self) -> anyhow::Result<()> {
        self.store.clear_checkpoint(&self.id::<C>()).await
    }
}
