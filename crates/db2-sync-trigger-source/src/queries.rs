//! SQL text for change tracking.
//!
//! Every builder is a pure function of its inputs so the generated DDL can be
//! checked character for character. Identifiers are interpolated as given;
//! they are validated when the configuration is parsed.

use crate::error::ProvisionError;
use db2_types::{ColumnTypes, Db2Value};

/// Operation marker column of the tracking table (`insert|update|delete`).
pub const COLUMN_OPERATION_TYPE: &str = "CONDUIT_OPERATION_TYPE";
/// Insertion time of a tracking row.
pub const COLUMN_TRACKING_CREATED_DATE: &str = "CONDUIT_TRACKING_CREATED_DATE";
/// Strictly increasing identity of a tracking row; the CDC cursor.
pub const COLUMN_TRACKING_ID: &str = "CONDUIT_TRACKING_ID";

const TRACKING_TABLE_PREFIX: &str = "CONDUIT_TRACKING_";
const TRIGGER_PREFIX: &str = "CONDUIT_TRIGGER_";

/// Bookkeeping columns that never appear in record payloads.
pub const TRACKING_COLUMNS: [&str; 3] = [
    COLUMN_OPERATION_TYPE,
    COLUMN_TRACKING_CREATED_DATE,
    COLUMN_TRACKING_ID,
];

/// Data-changing statement a trigger fires on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerOperation {
    Insert,
    Update,
    Delete,
}

impl TriggerOperation {
    pub const ALL: [TriggerOperation; 3] = [
        TriggerOperation::Insert,
        TriggerOperation::Update,
        TriggerOperation::Delete,
    ];

    /// Literal stored in the operation marker column.
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerOperation::Insert => "insert",
            TriggerOperation::Update => "update",
            TriggerOperation::Delete => "delete",
        }
    }

    pub fn parse(marker: &str) -> Option<Self> {
        match marker.trim() {
            "insert" => Some(TriggerOperation::Insert),
            "update" => Some(TriggerOperation::Update),
            "delete" => Some(TriggerOperation::Delete),
            _ => None,
        }
    }

    /// Delete triggers see the old row image, the others the new one.
    fn row_reference(&self) -> &'static str {
        match self {
            TriggerOperation::Delete => "OLD",
            _ => "NEW",
        }
    }
}

/// A statement with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundQuery {
    pub sql: String,
    pub params: Vec<Db2Value>,
}

/// The three trigger statements for one source table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triggers {
    pub insert: String,
    pub update: String,
    pub delete: String,
}

impl Triggers {
    pub fn iter(&self) -> impl Iterator<Item = (TriggerOperation, &str)> {
        [
            (TriggerOperation::Insert, self.insert.as_str()),
            (TriggerOperation::Update, self.update.as_str()),
            (TriggerOperation::Delete, self.delete.as_str()),
        ]
        .into_iter()
    }
}

fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.rsplit_once('.') {
        Some((schema, object)) => (Some(schema), object),
        None => (None, name),
    }
}

fn qualify(schema: Option<&str>, object: String) -> String {
    match schema {
        Some(schema) => format!("{schema}.{object}"),
        None => object,
    }
}

/// `CLIENTS` → `CONDUIT_TRACKING_CLIENTS`; a schema qualifier is kept in front.
pub fn tracking_table_name(table: &str) -> String {
    let (schema, name) = split_qualified(table);
    qualify(schema, format!("{TRACKING_TABLE_PREFIX}{name}"))
}

/// `CONDUIT_TRIGGER_<op>_<TABLE>`, in the schema of the source table.
pub fn trigger_name(operation: TriggerOperation, table: &str) -> String {
    let (schema, name) = split_qualified(table);
    qualify(
        schema,
        format!("{TRIGGER_PREFIX}{}_{name}", operation.as_str()),
    )
}

/// `CONDUIT_TRACKING_<TRACKING>_ID_UNIQUE_IND`.
pub fn unique_index_name(tracking: &str) -> String {
    let (schema, name) = split_qualified(tracking);
    qualify(schema, format!("{TRACKING_TABLE_PREFIX}{name}_ID_UNIQUE_IND"))
}

/// Empty structural copy of the source table.
pub fn build_tracking_table_ddl(source: &str, tracking: &str) -> String {
    format!("CREATE TABLE {tracking} AS (SELECT * FROM {source}) WITH NO DATA")
}

/// Add the operation marker, creation timestamp and identity columns.
pub fn build_augmentation_ddl(tracking: &str, op_col: &str, ts_col: &str, id_col: &str) -> String {
    format!(
        "ALTER TABLE {tracking} \
         ADD COLUMN {op_col} VARCHAR(10) \
         ADD COLUMN {ts_col} TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP \
         ADD COLUMN {id_col} INT"
    )
}

pub fn build_not_null_ddl(tracking: &str, column: &str) -> String {
    format!("ALTER TABLE {tracking} ALTER COLUMN {column} SET NOT NULL")
}

/// Identity generation that wraps around instead of failing at the INT limit.
pub fn build_identity_ddl(tracking: &str, id_col: &str) -> String {
    format!("ALTER TABLE {tracking} ALTER COLUMN {id_col} SET GENERATED BY DEFAULT AS IDENTITY (CYCLE)")
}

pub fn build_unique_index_ddl(tracking: &str, id_col: &str) -> String {
    format!(
        "CREATE UNIQUE INDEX {} ON {tracking}({id_col})",
        unique_index_name(tracking)
    )
}

/// Reorganize after the ALTERs, which leave the table in reorg-pending state.
pub fn build_reorg_ddl(tracking: &str) -> String {
    format!("CALL sysproc.admin_cmd('reorg table {tracking}')")
}

/// Catalog count of tables named `tracking`.
pub fn build_table_exists_query(tracking: &str) -> BoundQuery {
    let (schema, name) = split_qualified(tracking);
    match schema {
        Some(schema) => BoundQuery {
            sql: "SELECT count(*) AS count FROM SYSCAT.TABLES WHERE TABNAME = ? AND TABSCHEMA = ?"
                .to_string(),
            params: vec![
                Db2Value::Text(name.to_uppercase()),
                Db2Value::Text(schema.to_uppercase()),
            ],
        },
        None => BoundQuery {
            sql: "SELECT count(*) AS count FROM SYSCAT.TABLES WHERE TABNAME = ?".to_string(),
            params: vec![Db2Value::Text(name.to_uppercase())],
        },
    }
}

/// Build the insert, update and delete triggers copying each changed row into
/// the tracking table.
///
/// Columns are listed in sorted name order in both the INSERT column list and
/// the VALUES list, with the operation marker last.
pub fn build_triggers(
    tracking: &str,
    source: &str,
    column_types: &ColumnTypes,
) -> Result<Triggers, ProvisionError> {
    if column_types.is_empty() {
        return Err(ProvisionError::NoColumns(source.to_string()));
    }

    let columns: Vec<&str> = column_types.keys().map(String::as_str).collect();
    let insert_list = columns
        .iter()
        .copied()
        .chain(std::iter::once(COLUMN_OPERATION_TYPE))
        .collect::<Vec<_>>()
        .join(", ");
    let value_list = columns
        .iter()
        .map(|c| format!("rw.{c}"))
        .collect::<Vec<_>>()
        .join(", ");

    let build = |operation: TriggerOperation| {
        format!(
            "CREATE OR REPLACE TRIGGER {trigger} AFTER {event} ON {source} \
             REFERENCING {row} ROW AS rw FOR EACH ROW \
             BEGIN ATOMIC INSERT INTO {tracking} ({insert_list}) VALUES ({value_list}, '{marker}'); END",
            trigger = trigger_name(operation, source),
            event = operation.as_str().to_uppercase(),
            row = operation.row_reference(),
            marker = operation.as_str(),
        )
    };

    Ok(Triggers {
        insert: build(TriggerOperation::Insert),
        update: build(TriggerOperation::Update),
        delete: build(TriggerOperation::Delete),
    })
}

pub fn build_max_value_query(column: &str, table: &str) -> String {
    format!("SELECT max({column}) FROM {table}")
}

fn select_list(columns: &[String]) -> String {
    if columns.is_empty() {
        "*".to_string()
    } else {
        columns.join(", ")
    }
}

/// One snapshot page: rows up to the watermark in ordering-column order.
///
/// Binds `(last_processed, watermark)` when `has_lower_bound`, otherwise
/// only `(watermark)`.
pub fn build_snapshot_query(
    table: &str,
    columns: &[String],
    ordering: &str,
    has_lower_bound: bool,
    batch_size: usize,
) -> String {
    let condition = if has_lower_bound {
        format!("{ordering} > ? AND {ordering} <= ?")
    } else {
        format!("{ordering} <= ?")
    };
    format!(
        "SELECT {} FROM {table} WHERE {condition} ORDER BY {ordering} FETCH FIRST {batch_size} ROWS ONLY",
        select_list(columns)
    )
}

/// One CDC page: tracking rows after the bound cursor, in identity order.
pub fn build_cdc_query(tracking: &str, columns: &[String], batch_size: usize) -> String {
    let select = if columns.is_empty() {
        "*".to_string()
    } else {
        format!(
            "{}, {COLUMN_OPERATION_TYPE}, {COLUMN_TRACKING_ID}",
            columns.join(", ")
        )
    };
    format!(
        "SELECT {select} FROM {tracking} WHERE {COLUMN_TRACKING_ID} > ? \
         ORDER BY {COLUMN_TRACKING_ID} FETCH FIRST {batch_size} ROWS ONLY"
    )
}

/// Remove tracking rows up to and including the bound identity.
pub fn build_prune_query(tracking: &str) -> String {
    format!("DELETE FROM {tracking} WHERE {COLUMN_TRACKING_ID} <= ?")
}

/// Highest identity currently in the tracking table.
pub fn build_max_tracking_id_query(tracking: &str) -> String {
    format!("SELECT COALESCE(max({COLUMN_TRACKING_ID}), 0) FROM {tracking}")
}

pub fn build_drop_trigger_ddl(operation: TriggerOperation, table: &str) -> String {
    format!("DROP TRIGGER {}", trigger_name(operation, table))
}

pub fn build_drop_table_ddl(tracking: &str) -> String {
    format!("DROP TABLE {tracking}")
}
