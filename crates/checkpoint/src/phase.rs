//! Sync phase enumeration for checkpoint tracking.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Phase the source was in when a checkpoint was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// Reading the existing rows of the source table.
    ///
    /// Resuming from a snapshot checkpoint continues after the last ordering
    /// value that was handed off.
    Snapshot,

    /// Polling the tracking table.
    Cdc,
}

impl SyncPhase {
    /// Get the string representation of this phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Snapshot => "snapshot",
            SyncPhase::Cdc => "cdc",
        }
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncPhase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "snapshot" => Ok(SyncPhase::Snapshot),
            "cdc" => Ok(SyncPhase::Cdc),
            other => Err(anyhow::anyhow!("Unknown sync phase: {other}")),
        }
    }
}
