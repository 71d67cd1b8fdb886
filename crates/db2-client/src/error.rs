//! Error types for db2-client crate.

use db2_types::ConversionError;
use thiserror::Error;

/// Errors raised by a [`crate::Connection`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The database rejected the statement
    #[error("DB2 error [{}]: {message}", .sqlstate.as_deref().unwrap_or("-----"))]
    Database {
        sqlstate: Option<String>,
        message: String,
    },

    /// The connection could not be established
    #[error("Failed to connect to DB2: {0}")]
    Connect(String),

    /// The connection was already closed
    #[error("Connection is closed")]
    Closed,

    /// The binary was built without a driver backend
    #[error("No DB2 driver available: rebuild with the `odbc` feature to access a live database")]
    BackendUnavailable,

    /// A fetched value did not match its declared column type
    #[error("Failed to convert result value: {0}")]
    Conversion(#[from] ConversionError),

    /// A blocking driver task panicked or was cancelled
    #[error("Driver task failed: {0}")]
    Task(String),
}

impl ClientError {
    pub fn database(sqlstate: Option<&str>, message: impl Into<String>) -> Self {
        ClientError::Database {
            sqlstate: sqlstate.map(str::to_string),
            message: message.into(),
        }
    }

    /// Whether repeating the same operation unchanged may succeed.
    ///
    /// SQLSTATE class 08 is a connection exception; 40001 is a deadlock or
    /// timeout rollback and 57033 a lock timeout without rollback.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Connect(_) => true,
            ClientError::Database {
                sqlstate: Some(state),
                ..
            } => state.starts_with("08") || state == "40001" || state == "57033",
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ClientError::Connect("refused".into()).is_transient());
        assert!(ClientError::database(Some("08001"), "link down").is_transient());
        assert!(ClientError::database(Some("40001"), "deadlock").is_transient());
        assert!(!ClientError::database(Some("42S02"), "no such table").is_transient());
        assert!(!ClientError::database(None, "unknown").is_transient());
        assert!(!ClientError::Closed.is_transient());
    }

    #[test]
    fn test_display_includes_sqlstate() {
        let err = ClientError::database(Some("42704"), "undefined name");
        assert_eq!(err.to_string(), "DB2 error [42704]: undefined name");
        let err = ClientError::database(None, "boom");
        assert_eq!(err.to_string(), "DB2 error [-----]: boom");
    }
}
