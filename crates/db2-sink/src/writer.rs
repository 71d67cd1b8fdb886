//! MERGE/DELETE writer.
//!
//! Every data check (payload, key shape, composite keys, identifiers) runs
//! before the first database call, so a rejected record never touches the
//! connection. Table, key and column names taken from a record are validated
//! like configured names before they are spliced into SQL text.

use crate::error::WriterError;
use crate::queries::{build_delete_query, build_merge_query};
use crate::traits::ChangeSink;
use db2_client::{ColumnTypeService, Connection};
use db2_types::{convert_structured, ColumnTypes, Db2Value};
use std::collections::HashMap;
use std::sync::Arc;
use sync_core::config::{identifier, KEY_COLUMNS, KEY_PRIMARY_KEY, KEY_TABLE};
use sync_core::{Action, ChangeRecord, Config, Data, StructuredData};
use tokio::sync::RwLock;
use tracing::debug;

pub struct Writer {
    conn: Arc<dyn Connection>,
    column_types: Arc<dyn ColumnTypeService>,
    config: Config,
    /// Column types per resolved table, loaded on first write
    cache: RwLock<HashMap<String, ColumnTypes>>,
}

impl Writer {
    pub fn new(
        conn: Arc<dyn Connection>,
        column_types: Arc<dyn ColumnTypeService>,
        config: Config,
    ) -> Self {
        Self {
            conn,
            column_types,
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Route a record to [`Writer::upsert`] or [`Writer::delete`].
    pub async fn write(&self, record: &ChangeRecord) -> Result<(), WriterError> {
        match record.action() {
            Action::Delete => self.delete(record).await,
            Action::Upsert => self.upsert(record).await,
        }
    }

    /// Insert or update the record's row image, keyed on a single column.
    pub async fn upsert(&self, record: &ChangeRecord) -> Result<(), WriterError> {
        let table = self.table_for(record);

        let mut payload = match &record.payload.after {
            Some(data) => data.structurize().map_err(WriterError::InvalidPayload)?,
            None => None,
        }
        .ok_or(WriterError::EmptyPayload)?;

        // A key that does not parse is not fatal for upserts; the configured
        // key column and the payload value are used instead.
        let key = match record.key.as_ref().map(Data::structurize).transpose() {
            Ok(key) => key.flatten().unwrap_or_default(),
            Err(e) => {
                debug!("Ignoring malformed key during upsert into {table}: {e}");
                StructuredData::new()
            }
        };

        let key_column = self.key_column(&key)?;
        if !payload.contains_key(&key_column) {
            if let Some(value) = key.get(&key_column) {
                payload.insert(key_column.clone(), value.clone());
            }
        }
        check_identifiers(table, &key_column, payload.keys())?;

        let types = self.types_for(table).await?;
        let (columns, values): (Vec<String>, Vec<Db2Value>) =
            convert_structured(&payload, &types)?.into_iter().unzip();
        let sql = merge_statement(table, &key_column, &columns, &values)?;

        debug!("Upserting into {table} on {key_column}: {sql}");
        self.conn.execute(&sql, &values).await?;
        Ok(())
    }

    /// Delete the row identified by the record key.
    pub async fn delete(&self, record: &ChangeRecord) -> Result<(), WriterError> {
        let table = self.table_for(record);

        let key = match &record.key {
            Some(data) => data.structurize().map_err(WriterError::InvalidKey)?,
            None => None,
        }
        .unwrap_or_default();

        let key_column = self.key_column(&key)?;
        check_identifiers(table, &key_column, std::iter::empty())?;
        let Some(value) = key.get(&key_column) else {
            return Err(WriterError::EmptyKey(key_column));
        };

        let types = self.types_for(table).await?;
        let single = StructuredData::from([(key_column.clone(), value.clone())]);
        let params: Vec<Db2Value> = convert_structured(&single, &types)?.into_values().collect();

        let sql = build_delete_query(table, &key_column);
        debug!("Deleting from {table} where {key_column} = {value}");
        self.conn.execute(&sql, &params).await?;
        Ok(())
    }

    pub async fn close(&self) -> Result<(), WriterError> {
        self.conn.close().await?;
        Ok(())
    }

    fn table_for<'a>(&'a self, record: &'a ChangeRecord) -> &'a str {
        record
            .metadata
            .table
            .as_deref()
            .unwrap_or(&self.config.table)
    }

    /// The single key field of the record, or the configured key column.
    fn key_column(&self, key: &StructuredData) -> Result<String, WriterError> {
        if key.len() > 1 {
            return Err(WriterError::CompositeKeysNotSupported(key.len()));
        }
        Ok(key
            .keys()
            .next()
            .cloned()
            .unwrap_or_else(|| self.config.key.clone()))
    }

    async fn types_for(&self, table: &str) -> Result<ColumnTypes, WriterError> {
        if let Some(types) = self.cache.read().await.get(table) {
            return Ok(types.clone());
        }

        let types = self.column_types.column_types(table).await?;
        debug!("Loaded {} column types for {table}", types.len());
        self.cache
            .write()
            .await
            .insert(table.to_string(), types.clone());
        Ok(types)
    }
}

#[async_trait::async_trait]
impl ChangeSink for Writer {
    async fn apply_change(&self, record: &ChangeRecord) -> Result<(), WriterError> {
        self.write(record).await
    }

    async fn close(&self) -> Result<(), WriterError> {
        Writer::close(self).await
    }
}

fn check_identifiers<'a>(
    table: &str,
    key_column: &str,
    columns: impl IntoIterator<Item = &'a String>,
) -> Result<(), WriterError> {
    identifier(KEY_TABLE, table)?;
    identifier(KEY_PRIMARY_KEY, key_column)?;
    for column in columns {
        identifier(KEY_COLUMNS, column)?;
    }
    Ok(())
}

fn merge_statement(
    table: &str,
    key: &str,
    columns: &[String],
    values: &[Db2Value],
) -> Result<String, WriterError> {
    if columns.len() != values.len() {
        return Err(WriterError::ColumnsValuesLenMismatch {
            columns: columns.len(),
            values: values.len(),
        });
    }
    Ok(build_merge_query(table, key, columns))
}
