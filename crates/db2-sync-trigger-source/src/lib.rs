//! DB2 trigger-based sync for db2-sync
//!
//! Uses a tracking table + triggers for change capture. The iterator reads
//! the existing rows first and then polls the tracking table.

mod change_tracking;
pub mod checkpoint;
mod error;
pub mod queries;
mod source;

pub use change_tracking::{provisioning_statements, setup_change_tracking, teardown_change_tracking};
pub use checkpoint::{get_current_checkpoint, Db2Checkpoint};
pub use error::{ProvisionError, ProvisionStep, SourceError};
pub use source::{Batch, Db2Iterator};
