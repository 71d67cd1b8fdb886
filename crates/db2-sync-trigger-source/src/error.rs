//! Error types for provisioning and reading changes.

use db2_client::ClientError;
use db2_types::ConversionError;
use std::fmt;
use thiserror::Error;

/// Provisioning steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    LoadColumnTypes,
    CheckTrackingTable,
    CreateTrackingTable,
    AddTrackingColumns,
    SetNotNull,
    SetIdentity,
    CreateUniqueIndex,
    CreateTriggers,
    ReorgTrackingTable,
    DropTriggers,
    DropTrackingTable,
}

impl ProvisionStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionStep::LoadColumnTypes => "load_column_types",
            ProvisionStep::CheckTrackingTable => "check_tracking_table",
            ProvisionStep::CreateTrackingTable => "create_tracking_table",
            ProvisionStep::AddTrackingColumns => "add_tracking_columns",
            ProvisionStep::SetNotNull => "set_not_null",
            ProvisionStep::SetIdentity => "set_identity",
            ProvisionStep::CreateUniqueIndex => "create_unique_index",
            ProvisionStep::CreateTriggers => "create_triggers",
            ProvisionStep::ReorgTrackingTable => "reorg_tracking_table",
            ProvisionStep::DropTriggers => "drop_triggers",
            ProvisionStep::DropTrackingTable => "drop_tracking_table",
        }
    }
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The source table reported no columns, so no trigger can be built
    #[error("Table '{0}' has no columns; cannot build change tracking triggers")]
    NoColumns(String),

    /// A provisioning statement failed; the database error is kept verbatim
    #[error("Change tracking step '{step}' failed: {source}")]
    Step {
        step: ProvisionStep,
        #[source]
        source: ClientError,
    },
}

impl ProvisionError {
    pub(crate) fn step(step: ProvisionStep) -> impl FnOnce(ClientError) -> ProvisionError {
        move |source| ProvisionError::Step { step, source }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Client(#[from] ClientError),

    /// A tracking row carries an operation marker other than insert/update/delete
    #[error("Unknown operation '{operation}' in tracking row {tracking_id}")]
    UnknownOperation { tracking_id: i64, operation: String },

    /// A required column is absent from a fetched row
    #[error("Row is missing column '{0}'")]
    MissingColumn(String),

    #[error("Failed to convert value: {0}")]
    Conversion(#[from] ConversionError),
}

impl SourceError {
    /// Whether the error concerns the data of a single row rather than the
    /// connection or the configuration.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            SourceError::UnknownOperation { .. }
                | SourceError::MissingColumn(_)
                | SourceError::Conversion(_)
        )
    }
}
