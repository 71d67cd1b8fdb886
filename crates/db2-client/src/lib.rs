//! DB2 connection utilities
//!
//! Everything above this crate talks to DB2 through the [`Connection`]
//! trait, so the provisioner, iterator and writer can be exercised against a
//! scripted fake. A live backend over the DB2 CLI/ODBC driver is available
//! behind the `odbc` feature.

use async_trait::async_trait;
use db2_types::{Db2Value, Row};
use std::sync::Arc;
use tracing::info;

pub mod error;
#[cfg(feature = "odbc")]
pub mod odbc;
pub mod schema;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::ClientError;
pub use schema::{CatalogColumnTypes, ColumnTypeService};

/// A DB2 connection shared by the provisioner, iterator and writer of a table.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Run a statement that returns rows.
    async fn query(&self, sql: &str, params: &[Db2Value]) -> Result<Vec<Row>, ClientError>;

    /// Run a statement that does not return rows, returning the affected row count.
    async fn execute(&self, sql: &str, params: &[Db2Value]) -> Result<u64, ClientError>;

    /// Release the connection. Further calls fail with [`ClientError::Closed`].
    async fn close(&self) -> Result<(), ClientError>;

    /// Run a single-row, single-column query and return that value.
    async fn query_scalar(&self, sql: &str, params: &[Db2Value]) -> Result<Db2Value, ClientError> {
        let rows = self.query(sql, params).await?;
        Ok(rows
            .first()
            .and_then(Row::scalar)
            .cloned()
            .unwrap_or(Db2Value::Null))
    }
}

/// Open a connection with the compiled-in driver backend.
pub async fn connect(connection_string: &str) -> Result<Arc<dyn Connection>, ClientError> {
    info!(
        "Connecting to DB2 at '{}'",
        sanitize_connection_string(connection_string)
    );

    #[cfg(feature = "odbc")]
    {
        let conn = odbc::OdbcConnection::connect(connection_string).await?;
        Ok(Arc::new(conn))
    }

    #[cfg(not(feature = "odbc"))]
    {
        Err(ClientError::BackendUnavailable)
    }
}

/// Sanitize a connection string for logging (hide the password).
///
/// `HOSTNAME=db;UID=user;PWD=secret` becomes `HOSTNAME=db;UID=user;PWD=***`.
pub fn sanitize_connection_string(connection_string: &str) -> String {
    connection_string
        .split(';')
        .map(|part| match part.split_once('=') {
            Some((key, _))
                if key.trim().eq_ignore_ascii_case("PWD")
                    || key.trim().eq_ignore_ascii_case("PASSWORD") =>
            {
                format!("{key}=***")
            }
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Turn a DB2 CLI style connection string into one an ODBC driver manager
/// accepts, adding the driver and protocol keywords when absent.
pub fn odbc_connection_string(connection_string: &str) -> String {
    let has_key = |wanted: &str| {
        connection_string.split(';').any(|part| {
            part.split_once('=')
                .is_some_and(|(key, _)| key.trim().eq_ignore_ascii_case(wanted))
        })
    };

    let mut prefix = String::new();
    if !has_key("DRIVER") && !has_key("DSN") {
        prefix.push_str("DRIVER={IBM DB2 ODBC DRIVER};");
    }
    if !has_key("PROTOCOL") && !has_key("DSN") {
        prefix.push_str("PROTOCOL=TCPIP;");
    }
    format!("{prefix}{connection_string}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_connection_string() {
        assert_eq!(
            sanitize_connection_string("HOSTNAME=db;PORT=50000;UID=db2inst1;PWD=s3cret;"),
            "HOSTNAME=db;PORT=50000;UID=db2inst1;PWD=***;"
        );
        assert_eq!(
            sanitize_connection_string("DSN=sample;password=abc"),
            "DSN=sample;password=***"
        );
        assert_eq!(sanitize_connection_string("DSN=sample"), "DSN=sample");
    }

    #[test]
    fn test_odbc_connection_string() {
        assert_eq!(
            odbc_connection_string("HOSTNAME=db;DATABASE=testdb"),
            "DRIVER={IBM DB2 ODBC DRIVER};PROTOCOL=TCPIP;HOSTNAME=db;DATABASE=testdb"
        );
        assert_eq!(
            odbc_connection_string("Driver={Db2};Protocol=TCPIP;HOSTNAME=db"),
            "Driver={Db2};Protocol=TCPIP;HOSTNAME=db"
        );
        assert_eq!(odbc_connection_string("DSN=sample"), "DSN=sample");
    }

    #[cfg(not(feature = "odbc"))]
    #[tokio::test]
    async fn test_connect_without_backend() {
        let result = connect("HOSTNAME=db;PWD=x").await;
        assert!(matches!(result, Err(ClientError::BackendUnavailable)));
    }

    #[tokio::test]
    async fn test_query_scalar_defaults_to_null() {
        let conn = testing::FakeConnection::new();
        conn.on_query("count(*)", vec![Row::new().with("COUNT", 3i64)]);

        let count = conn
            .query_scalar("SELECT count(*) AS count FROM X", &[])
            .await
            .unwrap();
        assert_eq!(count, Db2Value::BigInt(3));

        let missing = conn.query_scalar("SELECT max(ID) FROM X", &[]).await.unwrap();
        assert_eq!(missing, Db2Value::Null);
    }
}
