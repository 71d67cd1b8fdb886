//! ODBC backend over the IBM DB2 CLI driver.
//!
//! odbc-api is synchronous, so every call runs on the blocking pool while the
//! connection itself sits behind a mutex. Parameters are bound as text and
//! result columns are fetched as text, then typed again from the column
//! metadata the driver reports.

use crate::{odbc_connection_string, ClientError, Connection};
use async_trait::async_trait;
use db2_types::{parse_text, Db2Type, Db2Value, Row};
use odbc_api::buffers::TextRowSet;
use odbc_api::{
    ConnectionOptions, Cursor, DataType, Environment, IntoParameter, ResultSetMetadata,
};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::debug;

/// Rows fetched per round trip.
const FETCH_BATCH: usize = 512;
/// Upper bound for a single text column buffer.
const MAX_TEXT_LEN: usize = 32 * 1024;

static ENVIRONMENT: OnceLock<Environment> = OnceLock::new();

fn environment() -> Result<&'static Environment, ClientError> {
    if let Some(env) = ENVIRONMENT.get() {
        return Ok(env);
    }
    let env = Environment::new().map_err(|e| ClientError::Connect(e.to_string()))?;
    Ok(ENVIRONMENT.get_or_init(|| env))
}

type Inner = Arc<Mutex<Option<odbc_api::Connection<'static>>>>;

pub struct OdbcConnection {
    inner: Inner,
}

impl OdbcConnection {
    pub async fn connect(connection_string: &str) -> Result<Self, ClientError> {
        let connection_string = odbc_connection_string(connection_string);
        let conn = tokio::task::spawn_blocking(move || {
            environment()?
                .connect_with_connection_string(&connection_string, ConnectionOptions::default())
                .map_err(|e| ClientError::Connect(e.to_string()))
        })
        .await
        .map_err(|e| ClientError::Task(e.to_string()))??;

        Ok(Self {
            inner: Arc::new(Mutex::new(Some(conn))),
        })
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T, ClientError>
    where
        T: Send + 'static,
        F: FnOnce(&odbc_api::Connection<'static>) -> Result<T, ClientError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let guard = inner
                .lock()
                .map_err(|_| ClientError::Task("connection mutex poisoned".to_string()))?;
            let conn = guard.as_ref().ok_or(ClientError::Closed)?;
            f(conn)
        })
        .await
        .map_err(|e| ClientError::Task(e.to_string()))?
    }
}

#[async_trait]
impl Connection for OdbcConnection {
    async fn query(&self, sql: &str, params: &[Db2Value]) -> Result<Vec<Row>, ClientError> {
        debug!("query: {sql}");
        let sql = sql.to_string();
        let params = params.to_vec();
        self.with_connection(move |conn| run_query(conn, &sql, &params))
            .await
    }

    async fn execute(&self, sql: &str, params: &[Db2Value]) -> Result<u64, ClientError> {
        debug!("execute: {sql}");
        let sql = sql.to_string();
        let params = params.to_vec();
        self.with_connection(move |conn| run_execute(conn, &sql, &params))
            .await
    }

    async fn close(&self) -> Result<(), ClientError> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut guard = inner
                .lock()
                .map_err(|_| ClientError::Task("connection mutex poisoned".to_string()))?;
            // Dropping the handle disconnects
            guard.take();
            Ok(())
        })
        .await
        .map_err(|e| ClientError::Task(e.to_string()))?
    }
}

fn bind(params: &[Db2Value]) -> Vec<odbc_api::parameter::VarCharBox> {
    params
        .iter()
        .map(|p| p.to_sql_text().into_parameter())
        .collect()
}

fn run_query(
    conn: &odbc_api::Connection<'static>,
    sql: &str,
    params: &[Db2Value],
) -> Result<Vec<Row>, ClientError> {
    let bound = bind(params);
    let Some(mut cursor) = conn
        .execute(sql, bound.as_slice(), None)
        .map_err(odbc_error)?
    else {
        return Ok(Vec::new());
    };

    let names = cursor
        .column_names()
        .map_err(odbc_error)?
        .collect::<Result<Vec<String>, _>>()
        .map_err(odbc_error)?;
    let mut types = Vec::with_capacity(names.len());
    for index in 1..=names.len() {
        let data_type = cursor.col_data_type(index as u16).map_err(odbc_error)?;
        types.push(column_type(data_type));
    }

    let buffers =
        TextRowSet::for_cursor(FETCH_BATCH, &mut cursor, Some(MAX_TEXT_LEN)).map_err(odbc_error)?;
    let mut row_set_cursor = cursor.bind_buffer(buffers).map_err(odbc_error)?;

    let mut rows = Vec::new();
    while let Some(batch) = row_set_cursor.fetch().map_err(odbc_error)? {
        for row_index in 0..batch.num_rows() {
            let mut row = Row::new();
            for (col_index, (name, ty)) in names.iter().zip(&types).enumerate() {
                let text = batch
                    .at_as_str(col_index, row_index)
                    .map_err(|e| ClientError::database(None, e.to_string()))?;
                row.push(name.clone(), parse_text(text, ty)?);
            }
            rows.push(row);
        }
    }
    Ok(rows)
}

fn run_execute(
    conn: &odbc_api::Connection<'static>,
    sql: &str,
    params: &[Db2Value],
) -> Result<u64, ClientError> {
    let bound = bind(params);
    let mut prepared = conn.prepare(sql).map_err(odbc_error)?;
    prepared.execute(bound.as_slice()).map_err(odbc_error)?;
    let affected = prepared.row_count().map_err(odbc_error)?;
    Ok(affected.unwrap_or(0) as u64)
}

fn column_type(data_type: DataType) -> Db2Type {
    match data_type {
        DataType::SmallInt | DataType::TinyInt => Db2Type::SmallInt,
        DataType::Integer => Db2Type::Integer,
        DataType::BigInt => Db2Type::BigInt,
        DataType::Real => Db2Type::Real,
        DataType::Double | DataType::Float { .. } => Db2Type::Double,
        DataType::Decimal { precision, scale } | DataType::Numeric { precision, scale } => {
            Db2Type::from_catalog("DECIMAL", precision as i64, scale as i64)
        }
        DataType::Bit => Db2Type::Boolean,
        DataType::Date => Db2Type::Date,
        DataType::Time { .. } => Db2Type::Time,
        DataType::Timestamp { .. } => Db2Type::Timestamp,
        DataType::Binary { .. } | DataType::Varbinary { .. } | DataType::LongVarbinary { .. } => {
            Db2Type::Blob
        }
        _ => Db2Type::VarChar { length: 0 },
    }
}

fn odbc_error(error: odbc_api::Error) -> ClientError {
    match &error {
        odbc_api::Error::Diagnostics { record, .. } => {
            ClientError::database(Some(record.state.as_str()), error.to_string())
        }
        _ => ClientError::database(None, error.to_string()),
    }
}
