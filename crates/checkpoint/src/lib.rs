//! Checkpoint management for db2-sync
//!
//! Provides storage-agnostic persistence of iterator positions so a
//! restarted pipeline resumes where the previous run stopped.
//!
//! # Architecture
//!
//! - The `Checkpoint` trait is implemented by source-specific position types
//! - `CheckpointFile` wraps a checkpoint with its type, phase and table
//! - `SyncManager` saves and loads checkpoints through a `CheckpointStore`
//!
//! ## Storage Backends
//!
//! - `FilesystemStore` - One JSON file per source table, replaced atomically
//! - `MemoryStore` - In-process map, for tests and dry runs

mod file;
mod filesystem;
mod manager;
mod phase;
pub mod store;

#[cfg(test)]
mod tests;

pub use file::CheckpointFile;
pub use filesystem::FilesystemStore;
pub use manager::SyncManager;
pub use phase::SyncPhase;
pub use store::{CheckpointID, CheckpointStore, MemoryStore, StoredCheckpoint};

/// Trait that source-specific checkpoints must implement.
///
/// # Example
///
/// ```rust
/// use checkpoint::Checkpoint;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct SequenceCheckpoint {
///     pub sequence: i64,
/// }
///
/// impl Checkpoint for SequenceCheckpoint {
///     const DATABASE_TYPE: &'static str = "sequence";
///
///     fn to_cli_string(&self) -> String {
///         self.sequence.to_string()
///     }
///
///     fn from_cli_string(s: &str) -> anyhow::Result<Self> {
///         Ok(Self { sequence: s.parse()? })
///     }
/// }
/// ```
pub trait Checkpoint: serde::Serialize + for<'de> serde::Deserialize<'de> + Clone {
    /// Source type identifier stored alongside the checkpoint and checked on load.
    const DATABASE_TYPE: &'static str;

    /// Compact, human-readable form used for `--from` style CLI flags and logs.
    ///
    /// Must be parseable by `from_cli_string()`.
    fn to_cli_string(&self) -> String;

    /// Parse the format produced by `to_cli_string()`.
    fn from_cli_string(s: &str) -> anyhow::Result<Self>
    where
        Self: Sized;
}
