//! Sink trait for applying change records.

use crate::error::WriterError;
use sync_core::ChangeRecord;

/// Anything that can apply a change record to a destination.
///
/// The pipeline is written against this trait so tests can substitute a
/// recording sink for the DB2 [`crate::Writer`].
#[async_trait::async_trait]
pub trait ChangeSink: Send + Sync {
    /// Apply one record, routing it to upsert or delete.
    async fn apply_change(&self, record: &ChangeRecord) -> Result<(), WriterError>;

    /// Release the destination connection.
    async fn close(&self) -> Result<(), WriterError>;
}
