//! DB2 checkpoint management
//!
//! The persisted checkpoint is the iterator [`Position`] itself, so a
//! restarted source resumes mid-snapshot or mid-CDC exactly where the last
//! acknowledged batch ended.

use crate::queries::{build_max_tracking_id_query, tracking_table_name};
use anyhow::Result;
use checkpoint::SyncPhase;
use db2_client::{ClientError, Connection};
use serde::{Deserialize, Serialize};
use sync_core::{IteratorMode, Position};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Db2Checkpoint(pub Position);

impl Db2Checkpoint {
    pub fn position(&self) -> &Position {
        &self.0
    }

    pub fn phase(&self) -> SyncPhase {
        match self.0.mode {
            IteratorMode::Snapshot => SyncPhase::Snapshot,
            IteratorMode::Cdc => SyncPhase::Cdc,
        }
    }
}

impl From<Position> for Db2Checkpoint {
    fn from(position: Position) -> Self {
        Self(position)
    }
}

impl checkpoint::Checkpoint for Db2Checkpoint {
    const DATABASE_TYPE: &'static str = "db2";

    /// `cdc:<tracking id>` for CDC positions; snapshot positions carry JSON
    /// ordering values and are rendered as the full JSON document.
    fn to_cli_string(&self) -> String {
        match self.0.mode {
            IteratorMode::Cdc => format!("cdc:{}", self.0.cdc_last_id),
            IteratorMode::Snapshot => {
                serde_json::to_string(&self.0).unwrap_or_else(|_| "snapshot".to_string())
            }
        }
    }

    fn from_cli_string(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(id) = s.strip_prefix("cdc:") {
            let id = id.parse::<i64>().map_err(|e| {
                anyhow::anyhow!("Invalid DB2 checkpoint: expected cdc:<id>, got '{s}': {e}")
            })?;
            return Ok(Self(Position::cdc(id)));
        }
        let position: Position = serde_json::from_str(s).map_err(|e| {
            anyhow::anyhow!("Invalid DB2 checkpoint: expected cdc:<id> or a position document, got '{s}': {e}")
        })?;
        Ok(Self(position))
    }
}

/// Checkpoint at the current end of the tracking table of `table`.
///
/// Starting from it skips the snapshot and every change already tracked.
pub async fn get_current_checkpoint(
    conn: &dyn Connection,
    table: &str,
) -> Result<Db2Checkpoint, ClientError> {
    let sql = build_max_tracking_id_query(&tracking_table_name(table));
    let max = conn.query_scalar(&sql, &[]).await?;
    Ok(Db2Checkpoint(Position::cdc(max.as_i64().unwrap_or(0))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkpoint::{Checkpoint, FilesystemStore, SyncManager};
    use db2_client::testing::FakeConnection;
    use db2_types::Row;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_cli_string_roundtrip() {
        let cdc = Db2Checkpoint(Position::cdc(12345));
        assert_eq!(cdc.to_cli_string(), "cdc:12345");
        let parsed = Db2Checkpoint::from_cli_string("cdc:12345").unwrap();
        assert_eq!(parsed.0.cdc_last_id, 12345);
        assert_eq!(parsed.phase(), SyncPhase::Cdc);

        let snapshot = Db2Checkpoint(Position::snapshot_start(json!(900), 0).with_snapshot_value(json!(10)));
        let parsed = Db2Checkpoint::from_cli_string(&snapshot.to_cli_string()).unwrap();
        assert_eq!(parsed, snapshot);
        assert_eq!(parsed.phase(), SyncPhase::Snapshot);

        assert!(Db2Checkpoint::from_cli_string("cdc:abc").is_err());
        assert!(Db2Checkpoint::from_cli_string("12").is_err());
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let manager = SyncManager::new(Box::new(FilesystemStore::new(tmp.path())), "CLIENTS");

        let original = Db2Checkpoint(Position::cdc(981));
        manager
            .emit_checkpoint(&original, original.phase())
            .await
            .unwrap();

        let loaded: Db2Checkpoint = manager.read_checkpoint().await.unwrap().unwrap();
        assert_eq!(loaded, original);
    }

    #[tokio::test]
    async fn test_current_checkpoint_reads_max_tracking_id() {
        let conn = FakeConnection::new();
        conn.on_query(
            "max(CONDUIT_TRACKING_ID)",
            vec![Row::new().with("1", 77i64)],
        );

        let checkpoint = get_current_checkpoint(&conn, "CLIENTS").await.unwrap();
        assert_eq!(checkpoint.0.cdc_last_id, 77);
        assert_eq!(
            conn.sql_log(),
            vec!["SELECT COALESCE(max(CONDUIT_TRACKING_ID), 0) FROM CONDUIT_TRACKING_CLIENTS"]
        );
    }
}
