//! Unit tests for the checkpoint crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::{
    Checkpoint, CheckpointFile, CheckpointID, CheckpointStore, FilesystemStore, MemoryStore,
    StoredCheckpoint, SyncManager, SyncPhase,
};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
struct TestCheckpoint {
    value: i64,
    timestamp: DateTime<Utc>,
}

impl Checkpoint for TestCheckpoint {
    const DATABASE_TYPE: &'static str = "test";

    fn to_cli_string(&self) -> String {
        self.value.to_string()
    }

    fn from_cli_string(s: &str) -> anyhow::Result<Self> {
        Ok(Self {
            value: s.parse()?,
            timestamp: Utc::now(),
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct OtherCheckpoint {
    value: i64,
}

impl Checkpoint for OtherCheckpoint {
    const DATABASE_TYPE: &'static str = "other";

    fn to_cli_string(&self) -> String {
        self.value.to_string()
    }

    fn from_cli_string(s: &str) -> anyhow::Result<Self> {
        Ok(Self { value: s.parse()? })
    }
}

fn checkpoint(value: i64) -> TestCheckpoint {
    TestCheckpoint {
        value,
        timestamp: Utc::now(),
    }
}

// ============================================================================
// CheckpointFile Tests
// ============================================================================

#[test]
fn test_checkpoint_file_roundtrip() {
    let original = checkpoint(12345);
    let file = CheckpointFile::new(&original, "CLIENTS", SyncPhase::Cdc).unwrap();

    let json = serde_json::to_string_pretty(&file).unwrap();
    assert!(json.contains(r#""phase": "cdc""#));

    let loaded: CheckpointFile = serde_json::from_str(&json).unwrap();
    let parsed: TestCheckpoint = loaded.parse().unwrap();
    assert_eq!(parsed.value, 12345);
    assert_eq!(loaded.table, "CLIENTS");
    assert_eq!(loaded.phase(), SyncPhase::Cdc);
}

#[test]
fn test_checkpoint_file_type_mismatch() {
    let file = CheckpointFile::new(&checkpoint(1), "CLIENTS", SyncPhase::Snapshot).unwrap();
    let result: anyhow::Result<OtherCheckpoint> = file.parse();
    let err = result.unwrap_err().to_string();
    assert!(err.contains("expected 'other', found 'test'"), "{err}");
}

#[test]
fn test_phase_parse() {
    assert_eq!("snapshot".parse::<SyncPhase>().unwrap(), SyncPhase::Snapshot);
    assert_eq!("cdc".parse::<SyncPhase>().unwrap(), SyncPhase::Cdc);
    assert!("full_sync_start".parse::<SyncPhase>().is_err());
}

// ============================================================================
// Store Tests
// ============================================================================

#[tokio::test]
async fn test_filesystem_store_replaces_single_file() {
    let tmp = TempDir::new().unwrap();
    let store = FilesystemStore::new(tmp.path().join("nested"));
    let id = CheckpointID::new("db2", "APP.CLIENTS");

    assert!(store.read_checkpoint(&id).await.unwrap().is_none());

    for n in 0..3 {
        let stored = StoredCheckpoint {
            checkpoint_data: n.to_string(),
            database_type: "db2".to_string(),
            table: "APP.CLIENTS".to_string(),
            phase: "cdc".to_string(),
            created_at: Utc::now(),
        };
        store.store_checkpoint(&id, stored).await.unwrap();
    }

    let files: Vec<_> = std::fs::read_dir(store.dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(files, vec!["checkpoint_db2_APP_CLIENTS.json".to_string()]);

    let loaded = store.read_checkpoint(&id).await.unwrap().unwrap();
    assert_eq!(loaded.checkpoint_data, "2");

    store.clear_checkpoint(&id).await.unwrap();
    assert!(store.read_checkpoint(&id).await.unwrap().is_none());
    // Clearing twice is fine
    store.clear_checkpoint(&id).await.unwrap();
}

// ============================================================================
// SyncManager Tests
// ============================================================================

#[tokio::test]
async fn test_manager_save_load_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let manager = SyncManager::new(Box::new(FilesystemStore::new(tmp.path())), "CLIENTS");

    let missing: Option<TestCheckpoint> = manager.read_checkpoint().await.unwrap();
    assert!(missing.is_none());

    manager
        .emit_checkpoint(&checkpoint(7), SyncPhase::Snapshot)
        .await
        .unwrap();
    manager
        .emit_checkpoint(&checkpoint(8), SyncPhase::Cdc)
        .await
        .unwrap();

    let loaded: TestCheckpoint = manager.read_checkpoint().await.unwrap().unwrap();
    assert_eq!(loaded.value, 8);

    let file = manager
        .read_checkpoint_file::<TestCheckpoint>()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(file.phase, SyncPhase::Cdc);
    assert_eq!(file.database_type(), "test");
}

#[tokio::test]
async fn test_manager_tables_are_isolated() {
    let store = std::sync::Arc::new(MemoryStore::new());

    struct Shared(std::sync::Arc<MemoryStore>);

    #[async_trait::async_trait]
    impl CheckpointStore for Shared {
        async fn store_checkpoint(
            &self,
            id: &CheckpointID,
            stored: StoredCheckpoint,
        ) -> anyhow::Result<()> {
            self.0.store_checkpoint(id, stored).await
        }

        async fn read_checkpoint(
            &self,
            id: &CheckpointID,
        ) -> anyhow::Result<Option<StoredCheckpoint>> {
            self.0.read_checkpoint(id).await
        }

        async fn clear_checkpoint(&self, id: &CheckpointID) -> anyhow::Result<()> {
            self.0.clear_checkpoint(id).await
        }
    }

    let clients = SyncManager::new(Box::new(Shared(store.clone())), "CLIENTS");
    let orders = SyncManager::new(Box::new(Shared(store.clone())), "ORDERS");

    clients
        .emit_checkpoint(&checkpoint(1), SyncPhase::Cdc)
        .await
        .unwrap();
    orders
        .emit_checkpoint(&checkpoint(2), SyncPhase::Cdc)
        .await
        .unwrap();

    let c: TestCheckpoint = clients.read_checkpoint().await.unwrap().unwrap();
    let o: TestCheckpoint = orders.read_checkpoint().await.unwrap().unwrap();
    assert_eq!((c.value, o.value), (1, 2));

    clients.clear_checkpoint::<TestCheckpoint>().await.unwrap();
    let cleared: Option<TestCheckpoint> = clients.read_checkpoint().await.unwrap();
    assert!(cleared.is_none());
    let still: Option<TestCheckpoint> = orders.read_checkpoint().await.unwrap();
    assert!(still.is_some());
}

#[tokio::test]
async fn test_manager_rejects_other_database_type() {
    let store = MemoryStore::new();
    store
        .store_checkpoint(
            &CheckpointID::new("test", "CLIENTS"),
            StoredCheckpoint {
                checkpoint_data: r#"{"value": 3}"#.to_string(),
                database_type: "other".to_string(),
                table: "CLIENTS".to_string(),
                phase: "cdc".to_string(),
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();

    let manager = SyncManager::new(Box::new(store), "CLIENTS");
    let result: anyhow::Result<Option<TestCheckpoint>> = manager.read_checkpoint().await;
    assert!(result.is_err());
}
