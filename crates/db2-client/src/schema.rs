//! Column type lookup against the DB2 catalog.

use crate::{ClientError, Connection};
use async_trait::async_trait;
use db2_types::{ColumnTypes, Db2Type, Db2Value};
use std::sync::Arc;
use tracing::debug;

/// Resolves the declared column types of a table.
#[async_trait]
pub trait ColumnTypeService: Send + Sync {
    /// Column name → declared type. An unknown table yields an empty mapping.
    async fn column_types(&self, table: &str) -> Result<ColumnTypes, ClientError>;
}

/// [`ColumnTypeService`] reading `SYSCAT.COLUMNS`.
pub struct CatalogColumnTypes {
    conn: Arc<dyn Connection>,
}

impl CatalogColumnTypes {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self { conn }
    }
}

/// Catalog query for a table's columns.
///
/// Without an explicit schema the lookup is limited to `CURRENT SCHEMA`,
/// the schema unqualified names resolve against.
pub fn build_column_types_query(with_schema: bool) -> &'static str {
    if with_schema {
        "SELECT COLNAME, TYPENAME, LENGTH, SCALE FROM SYSCAT.COLUMNS \
         WHERE TABNAME = ? AND TABSCHEMA = ? ORDER BY COLNO"
    } else {
        "SELECT COLNAME, TYPENAME, LENGTH, SCALE FROM SYSCAT.COLUMNS \
         WHERE TABNAME = ? AND TABSCHEMA = CURRENT SCHEMA ORDER BY COLNO"
    }
}

/// Split `SCHEMA.TABLE` into catalog parameters. Unquoted DB2 names are
/// stored upper-cased in the catalog.
fn catalog_params(table: &str) -> (bool, Vec<Db2Value>) {
    match table.rsplit_once('.') {
        Some((schema, name)) => (
            true,
            vec![
                Db2Value::Text(name.to_uppercase()),
                Db2Value::Text(schema.to_uppercase()),
            ],
        ),
        None => (false, vec![Db2Value::Text(table.to_uppercase())]),
    }
}

#[async_trait]
impl ColumnTypeService for CatalogColumnTypes {
    async fn column_types(&self, table: &str) -> Result<ColumnTypes, ClientError> {
        let (with_schema, params) = catalog_params(table);
        let rows = self
            .conn
            .query(build_column_types_query(with_schema), &params)
            .await?;

        let mut types = ColumnTypes::new();
        for row in rows {
            let Some(name) = row.get("COLNAME").and_then(Db2Value::as_str) else {
                continue;
            };
            let type_name = row
                .get("TYPENAME")
                .and_then(Db2Value::as_str)
                .unwrap_or_default();
            let length = row.get("LENGTH").and_then(Db2Value::as_i64).unwrap_or(0);
            let scale = row.get("SCALE").and_then(Db2Value::as_i64).unwrap_or(0);

            types.insert(
                name.trim().to_string(),
                Db2Type::from_catalog(type_name, length, scale),
            );
        }

        debug!("Loaded {} column types for table {table}", types.len());
        Ok(types)
    }
}
