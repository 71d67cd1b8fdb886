//! DB2 snapshot + CDC iterator
//!
//! The iterator first reads the existing rows of the source table up to a
//! watermark captured once (the snapshot), then polls the tracking table
//! populated by the change tracking triggers (CDC).
//!
//! ## Acknowledgement
//!
//! [`Db2Iterator::poll`] never moves the cursor. The caller hands the batch
//! off downstream and then calls [`Db2Iterator::ack`]; only then does the
//! next poll continue after it. A crash between the two re-delivers the
//! batch, which the idempotent writer absorbs.

use crate::error::SourceError;
use crate::queries::{
    build_cdc_query, build_max_tracking_id_query, build_max_value_query, build_prune_query,
    build_snapshot_query, tracking_table_name, TriggerOperation, COLUMN_OPERATION_TYPE, COLUMN_TRACKING_ID,
    TRACKING_COLUMNS,
};
use db2_client::{ColumnTypeService, Connection};
use db2_types::{db2_to_json, json_to_db2, json_to_db2_untyped, Db2Type, Db2Value, Row};
use std::sync::Arc;
use sync_core::{ChangeRecord, IteratorMode, Operation, Position, SourceConfig, StructuredData};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of one poll.
#[derive(Debug)]
pub struct Batch {
    /// Records in source order
    pub records: Vec<ChangeRecord>,
    /// Tracking rows that could not be turned into records; the position
    /// still moves past them
    pub rejected: Vec<SourceError>,
    /// Iterator position after this batch, applied by [`Db2Iterator::ack`]
    pub position: Position,
    /// No further rows were available when the batch was read
    pub caught_up: bool,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.rejected.is_empty()
    }
}

pub struct Db2Iterator {
    conn: Arc<dyn Connection>,
    config: SourceConfig,
    tracking_table: String,
    ordering_type: Option<Db2Type>,
    position: Position,
}

impl Db2Iterator {
    /// Create an iterator, resuming from `position` when given.
    ///
    /// Without a position the snapshot watermark is captured now, together
    /// with the current end of the tracking table. Changes tracked before
    /// that point are already part of the snapshot; CDC continues after it.
    /// An empty source table starts directly in CDC mode.
    pub async fn new(
        conn: Arc<dyn Connection>,
        column_types: &dyn ColumnTypeService,
        config: SourceConfig,
        position: Option<Position>,
    ) -> Result<Self, SourceError> {
        let table = &config.config.table;
        let tracking_table = tracking_table_name(table);
        let types = column_types.column_types(table).await?;
        let ordering_type = types
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&config.ordering_column))
            .map(|(_, ty)| ty.clone());

        let position = match position {
            Some(position) => {
                info!("Resuming {table} in {} mode", position.mode);
                position
            }
            None => {
                // Read before the watermark: a change landing in between is
                // replayed rather than lost.
                let cdc_start = conn
                    .query_scalar(&build_max_tracking_id_query(&tracking_table), &[])
                    .await?
                    .as_i64()
                    .unwrap_or(0);
                let max = conn
                    .query_scalar(&build_max_value_query(&config.ordering_column, table), &[])
                    .await?;
                if max.is_null() {
                    info!("Table {table} is empty, starting in cdc mode after tracking id {cdc_start}");
                    Position::cdc(cdc_start)
                } else {
                    let watermark = db2_to_json(&max);
                    info!(
                        "Starting snapshot of {table} up to {} = {watermark}, cdc after tracking id {cdc_start}",
                        config.ordering_column
                    );
                    Position::snapshot_start(watermark, cdc_start)
                }
            }
        };

        Ok(Self {
            tracking_table,
            conn,
            config,
            ordering_type,
            position,
        })
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Read the next batch without advancing the cursor.
    pub async fn poll(&self) -> Result<Batch, SourceError> {
        match self.position.mode {
            IteratorMode::Snapshot => self.poll_snapshot().await,
            IteratorMode::Cdc => self.poll_cdc().await,
        }
    }

    /// Advance the cursor past `batch`.
    ///
    /// With tracking pruning enabled this also deletes the acknowledged
    /// tracking rows. A failed prune is reported after the cursor has moved.
    pub async fn ack(&mut self, batch: &Batch) -> Result<(), SourceError> {
        let previous = std::mem::replace(&mut self.position, batch.position.clone());
        if previous.mode != self.position.mode {
            info!(
                "Table {} switched from {} to {} mode",
                self.config.config.table, previous.mode, self.position.mode
            );
        }

        if self.config.prune_tracking
            && self.position.mode == IteratorMode::Cdc
            && self.position.cdc_last_id > previous.cdc_last_id
        {
            let pruned = self
                .conn
                .execute(
                    &build_prune_query(&self.tracking_table),
                    &[Db2Value::BigInt(self.position.cdc_last_id)],
                )
                .await?;
            debug!("Pruned {pruned} rows from {}", self.tracking_table);
        }
        Ok(())
    }

    /// Poll until a non-empty batch or a phase switch is available.
    ///
    /// Backs off `poll_interval` while caught up. Returns `None` once
    /// `cancel` fires; the cursor is left untouched.
    pub async fn next_batch(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<Batch>, SourceError> {
        loop {
            let batch = tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                batch = self.poll() => batch?,
            };

            if !batch.is_empty() || batch.position.mode != self.position.mode {
                return Ok(Some(batch));
            }

            if batch.caught_up {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(None),
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }
    }

    fn bind_ordering(&self, value: &serde_json::Value) -> Result<Db2Value, SourceError> {
        Ok(match &self.ordering_type {
            Some(ty) => json_to_db2(value, ty)?,
            None => json_to_db2_untyped(value),
        })
    }

    async fn poll_snapshot(&self) -> Result<Batch, SourceError> {
        let config = &self.config;
        let Some(watermark) = self.position.snapshot_max_value.clone() else {
            return Ok(self.switched_to_cdc(Vec::new()));
        };

        let mut params = Vec::with_capacity(2);
        if let Some(last) = &self.position.snapshot_last_processed {
            params.push(self.bind_ordering(last)?);
        }
        params.push(self.bind_ordering(&watermark)?);

        let sql = build_snapshot_query(
            &config.config.table,
            &config.columns,
            &config.ordering_column,
            params.len() == 2,
            config.batch_size,
        );
        let rows = self.conn.query(&sql, &params).await?;
        let fetched = rows.len();

        let mut records = Vec::with_capacity(fetched);
        let mut position = self.position.clone();
        for row in &rows {
            let ordering = row
                .get(&config.ordering_column)
                .ok_or_else(|| SourceError::MissingColumn(config.ordering_column.clone()))?;
            position = position.with_snapshot_value(db2_to_json(ordering));
            records.push(self.record(Operation::Snapshot, row, position.clone()));
        }

        let reached_watermark = position.snapshot_last_processed.as_ref() == Some(&watermark);
        if fetched < config.batch_size || reached_watermark {
            debug!("Snapshot of {} complete", config.config.table);
            return Ok(self.switched_to_cdc(records));
        }

        debug!("Snapshot batch of {fetched} rows from {}", config.config.table);
        Ok(Batch {
            records,
            rejected: Vec::new(),
            position,
            caught_up: false,
        })
    }

    /// Final snapshot batch; its last record carries the CDC start position.
    fn switched_to_cdc(&self, mut records: Vec<ChangeRecord>) -> Batch {
        let position = Position::cdc(self.position.cdc_last_id);
        if let Some(last) = records.last_mut() {
            last.position = Some(position.clone());
        }
        Batch {
            records,
            rejected: Vec::new(),
            position,
            caught_up: false,
        }
    }

    async fn poll_cdc(&self) -> Result<Batch, SourceError> {
        let config = &self.config;
        let sql = build_cdc_query(&self.tracking_table, &config.columns, config.batch_size);
        let rows = self
            .conn
            .query(&sql, &[Db2Value::BigInt(self.position.cdc_last_id)])
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        let mut rejected = Vec::new();
        let mut last_id = self.position.cdc_last_id;

        for row in &rows {
            let tracking_id = row
                .get(COLUMN_TRACKING_ID)
                .and_then(Db2Value::as_i64)
                .ok_or_else(|| SourceError::MissingColumn(COLUMN_TRACKING_ID.to_string()))?;
            last_id = tracking_id;

            let marker = row
                .get(COLUMN_OPERATION_TYPE)
                .and_then(Db2Value::as_str)
                .unwrap_or_default();
            let operation = match TriggerOperation::parse(marker) {
                Some(TriggerOperation::Insert) => Operation::Create,
                Some(TriggerOperation::Update) => Operation::Update,
                Some(TriggerOperation::Delete) => Operation::Delete,
                None => {
                    warn!("Tracking row {tracking_id} has unknown operation '{marker}'");
                    rejected.push(SourceError::UnknownOperation {
                        tracking_id,
                        operation: marker.to_string(),
                    });
                    continue;
                }
            };

            records.push(self.record(operation, row, Position::cdc(tracking_id)));
        }

        if !rows.is_empty() {
            debug!(
                "CDC batch of {} rows from {} (ids up to {last_id})",
                rows.len(),
                self.tracking_table
            );
        }

        Ok(Batch {
            records,
            rejected,
            position: Position::cdc(last_id),
            caught_up: rows.len() < config.batch_size,
        })
    }

    fn record(&self, operation: Operation, row: &Row, position: Position) -> ChangeRecord {
        let key_column = &self.config.config.key;
        let mut key = StructuredData::new();
        let mut payload = StructuredData::new();

        for (column, value) in row.iter() {
            if TRACKING_COLUMNS
                .iter()
                .any(|c| c.eq_ignore_ascii_case(column))
            {
                continue;
            }
            let json = db2_to_json(value);
            if column.eq_ignore_ascii_case(key_column) {
                key.insert(key_column.clone(), json.clone());
            }
            payload.insert(column.to_string(), json);
        }

        ChangeRecord::new(operation, position, key, payload)
    }
}
