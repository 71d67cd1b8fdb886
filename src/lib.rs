//! db2-sync Library
//!
//! Change data capture for IBM DB2 without log readers: a tracking table
//! filled by triggers, an iterator that snapshots the table and then polls
//! the tracking table, and an idempotent MERGE/DELETE writer.
//!
//! # Crates
//!
//! - `db2_sync_trigger_source` - provisioning, snapshot + CDC iterator, checkpoints
//! - `db2_sink` - MERGE/DELETE writer
//! - `db2_client` - connection trait, catalog column types, ODBC backend
//! - `db2_types` - JSON <-> DB2 value conversion
//!
//! # CLI Usage
//!
//! ```bash
//! # Print the provisioning DDL for a table
//! db2-sync ddl --table CLIENTS --column ID=INTEGER --column NAME=VARCHAR(40)
//!
//! # Stream changes as JSON lines, resuming from the stored checkpoint
//! db2-sync source --connection "HOSTNAME=db2;DATABASE=app;UID=u;PWD=p" \
//!   --table CLIENTS --primary-key ID --ordering-column ID
//!
//! # Apply JSON-line change records to another database
//! db2-sync destination --connection ... --table CLIENTS --primary-key ID < changes.jsonl
//! ```

use clap::Args;

pub mod config;
pub mod pipeline;

/// Connection and table options shared by every command.
///
/// Each flag falls back to an environment variable and then to the
/// `--config` file.
#[derive(Args, Clone, Debug, Default)]
pub struct TableOpts {
    /// Configuration file (TOML or YAML) with the same keys as the flags
    #[arg(long, value_name = "PATH", env = "DB2_SYNC_CONFIG")]
    pub config: Option<std::path::PathBuf>,

    /// DB2 connection string (`HOSTNAME=...;DATABASE=...;UID=...;PWD=...`)
    #[arg(long, env = "DB2_CONNECTION")]
    pub connection: Option<String>,

    /// Table to read from or write to
    #[arg(long, env = "DB2_TABLE")]
    pub table: Option<String>,

    /// Key column
    #[arg(long, env = "DB2_PRIMARY_KEY")]
    pub primary_key: Option<String>,
}

/// Options only the source side reads.
#[derive(Args, Clone, Debug, Default)]
pub struct SourceOpts {
    /// Comma separated columns to read (all columns when omitted)
    #[arg(long, env = "DB2_COLUMNS")]
    pub columns: Option<String>,

    /// Column with increasing values used to page through the snapshot
    #[arg(long, env = "DB2_ORDERING_COLUMN")]
    pub ordering_column: Option<String>,

    /// Maximum rows per poll
    #[arg(long, env = "DB2_BATCH_SIZE")]
    pub batch_size: Option<String>,

    /// Wait between polls once caught up (e.g. `500ms`, `5s`)
    #[arg(long, env = "DB2_POLL_INTERVAL")]
    pub poll_interval: Option<String>,

    /// Delete tracking rows once they are acknowledged
    #[arg(long, env = "DB2_PRUNE_TRACKING")]
    pub prune_tracking: Option<String>,
}

/// Checkpoint persistence options.
#[derive(Args, Clone, Debug)]
pub struct CheckpointOpts {
    /// Directory holding the per-table checkpoint files
    #[arg(long, default_value = ".db2-sync-checkpoints", env = "DB2_SYNC_CHECKPOINT_DIR")]
    pub checkpoint_dir: std::path::PathBuf,

    /// Start from this checkpoint instead of the stored one
    /// (`cdc:<id>` or a position document)
    #[arg(long, value_name = "CHECKPOINT")]
    pub from_checkpoint: Option<String>,

    /// Skip the snapshot and start at the current end of the tracking table
    #[arg(long, conflicts_with = "from_checkpoint")]
    pub from_current: bool,
}
