//! Core types for the db2-sync framework.
//!
//! This crate provides the foundational types shared by the source
//! (trigger-based CDC) and destination (MERGE writer) halves of db2-sync:
//!
//! - [`ChangeRecord`] - A single change event flowing through the pipeline
//! - [`RecordMetadata`] - Typed per-record routing (table override, action)
//! - [`Position`] - Resumable iterator position (snapshot or CDC cursor)
//! - [`Config`] / [`SourceConfig`] - Typed connector configuration
//!
//! # Architecture
//!
//! ```text
//! sync-core (this crate)
//!    │
//!    ├─── db2-types               (DB2 column types and value conversion)
//!    ├─── db2-client              (Connection capability, catalog lookups)
//!    ├─── db2-sync-trigger-source (provisioning + snapshot/CDC iterator)
//!    └─── db2-sink                (MERGE/DELETE writer)
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use sync_core::config::{Config, KEY_CONNECTION, KEY_PRIMARY_KEY, KEY_TABLE};
//!
//! let raw = HashMap::from([
//!     (KEY_CONNECTION.to_string(), "DATABASE=testdb;UID=db2inst1".to_string()),
//!     (KEY_TABLE.to_string(), "CLIENTS".to_string()),
//!     (KEY_PRIMARY_KEY.to_string(), "ID".to_string()),
//! ]);
//!
//! let config = Config::parse(&raw).unwrap();
//! assert_eq!(config.table, "CLIENTS");
//! ```

pub mod config;
pub mod position;
pub mod record;

// Re-exports for convenience
pub use config::{Config, ConfigError, FieldSpec, SourceConfig};
pub use position::{IteratorMode, Position};
pub use record::{Action, ChangeRecord, Data, Operation, Payload, RecordMetadata, StructuredData};
