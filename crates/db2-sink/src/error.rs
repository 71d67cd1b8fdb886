use db2_client::ClientError;
use db2_types::ConversionError;
use sync_core::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("Record payload is empty")]
    EmptyPayload,

    #[error("Record key has no value for column '{0}'")]
    EmptyKey(String),

    #[error("Composite keys are not supported (got {0} key fields)")]
    CompositeKeysNotSupported(usize),

    #[error("Got {columns} columns but {values} values")]
    ColumnsValuesLenMismatch { columns: usize, values: usize },

    #[error("Record key is not a JSON object: {0}")]
    InvalidKey(#[source] serde_json::Error),

    #[error("Record payload is not a JSON object: {0}")]
    InvalidPayload(#[source] serde_json::Error),

    #[error("Record names an unusable identifier: {0}")]
    InvalidIdentifier(#[from] ConfigError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl WriterError {
    /// Errors caused by the record itself; retrying it unchanged cannot succeed.
    pub fn is_data_error(&self) -> bool {
        !matches!(self, WriterError::Client(_))
    }
}
