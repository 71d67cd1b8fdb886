//! DB2 writer for db2-sync change records.
//!
//! Upserts go through a single `MERGE` keyed on one column, deletes through a
//! keyed `DELETE`. Both are idempotent, so re-delivered records are harmless.

mod error;
pub mod queries;
mod traits;
mod writer;

pub use error::WriterError;
pub use traits::ChangeSink;
pub use writer::Writer;
