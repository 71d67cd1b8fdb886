//! Source, destination and sync loops.
//!
//! The source loop reads a batch, hands it to a [`BatchHandler`] (JSON lines
//! or a writer), then acknowledges it and persists the new position. A crash
//! anywhere before the checkpoint is written re-delivers the batch on restart.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use checkpoint::{Checkpoint, SyncManager};
use chrono::Utc;
use db2_client::Connection;
use db2_sink::ChangeSink;
use db2_sync_trigger_source::{get_current_checkpoint, Db2Checkpoint, Db2Iterator};
use futures::StreamExt;
use sync_core::{ChangeRecord, Position};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Longest accepted JSON line on the destination input.
const MAX_LINE_LEN: usize = 16 * 1024 * 1024;

/// What to do with a record that cannot be read or applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OnError {
    /// Log the record and continue
    Skip,
    /// Stop with an error
    #[default]
    Abort,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOpts {
    pub on_error: OnError,
    /// Stop once the iterator has nothing more to read instead of polling forever
    pub exit_when_caught_up: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub batches: u64,
    pub records: u64,
    pub skipped: u64,
}

/// Receives the records of one batch before it is acknowledged.
#[async_trait]
pub trait BatchHandler: Send {
    /// Process `records`; returns how many were skipped.
    async fn handle(&mut self, records: &[ChangeRecord]) -> anyhow::Result<u64>;
}

/// Writes records as JSON lines, flushing after every batch.
pub struct JsonLinesOutput<W> {
    writer: W,
}

impl<W> JsonLinesOutput<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> BatchHandler for JsonLinesOutput<W> {
    async fn handle(&mut self, records: &[ChangeRecord]) -> anyhow::Result<u64> {
        for record in records {
            let mut line = serde_json::to_vec(record)?;
            line.push(b'\n');
            self.writer.write_all(&line).await?;
        }
        self.writer.flush().await.context("Failed to flush output")?;
        Ok(0)
    }
}

/// Applies records through a [`ChangeSink`].
pub struct SinkOutput<'a, S> {
    sink: &'a S,
    on_error: OnError,
}

impl<'a, S> SinkOutput<'a, S> {
    pub fn new(sink: &'a S, on_error: OnError) -> Self {
        Self { sink, on_error }
    }
}

#[async_trait]
impl<'a, S: ChangeSink> BatchHandler for SinkOutput<'a, S> {
    async fn handle(&mut self, records: &[ChangeRecord]) -> anyhow::Result<u64> {
        let mut skipped = 0;
        for record in records {
            match self.sink.apply_change(record).await {
                Ok(()) => {}
                Err(e) if e.is_data_error() && self.on_error == OnError::Skip => {
                    warn!("Skipping {} record: {e}", record.operation);
                    skipped += 1;
                }
                Err(e) => return Err(e).context("Failed to apply change record"),
            }
        }
        Ok(skipped)
    }
}

/// Where a new iterator starts.
///
/// An explicit checkpoint wins, then `from_current`, then the stored
/// checkpoint. `None` means a fresh snapshot.
pub async fn starting_position(
    conn: &dyn Connection,
    manager: &SyncManager,
    from_checkpoint: Option<&str>,
    from_current: bool,
) -> anyhow::Result<Option<Position>> {
    if let Some(text) = from_checkpoint {
        let checkpoint = Db2Checkpoint::from_cli_string(text)?;
        info!("Starting from explicit checkpoint {}", checkpoint.to_cli_string());
        return Ok(Some(checkpoint.0));
    }
    if from_current {
        let checkpoint = get_current_checkpoint(conn, manager.table())
            .await
            .context("Failed to read the current tracking position")?;
        info!("Skipping snapshot, starting at {}", checkpoint.to_cli_string());
        return Ok(Some(checkpoint.0));
    }
    Ok(manager
        .read_checkpoint::<Db2Checkpoint>()
        .await?
        .map(|checkpoint| checkpoint.0))
}

/// Drive `iterator` into `handler` until cancelled (or caught up, if asked).
pub async fn run_changes<H: BatchHandler>(
    iterator: &mut Db2Iterator,
    handler: &mut H,
    manager: Option<&SyncManager>,
    opts: PipelineOpts,
    cancel: &CancellationToken,
) -> anyhow::Result<PipelineStats> {
    let started = Utc::now();
    let mut stats = PipelineStats::default();

    loop {
        let batch = if opts.exit_when_caught_up {
            tokio::select! {
                _ = cancel.cancelled() => break,
                batch = iterator.poll() => batch?,
            }
        } else {
            match iterator.next_batch(cancel).await? {
                Some(batch) => batch,
                None => break,
            }
        };

        for rejected in &batch.rejected {
            match opts.on_error {
                OnError::Skip => {
                    warn!("Skipping tracking row: {rejected}");
                    stats.skipped += 1;
                }
                OnError::Abort => return Err(anyhow!("Unreadable change: {rejected}")),
            }
        }

        stats.skipped += handler.handle(&batch.records).await?;
        iterator
            .ack(&batch)
            .await
            .context("Failed to acknowledge batch")?;

        if let Some(manager) = manager {
            let checkpoint = Db2Checkpoint::from(iterator.position().clone());
            manager
                .emit_checkpoint(&checkpoint, checkpoint.phase())
                .await
                .context("Failed to persist checkpoint")?;
        }

        stats.batches += 1;
        stats.records += batch.records.len() as u64;
        debug!(
            "Batch {} done: {} records, position {}",
            stats.batches,
            batch.records.len(),
            iterator.position().mode
        );

        if opts.exit_when_caught_up && batch.caught_up && !iterator.position().is_snapshot() {
            break;
        }
    }

    info!(
        "Processed {} records in {} batches ({} skipped) in {}s",
        stats.records,
        stats.batches,
        stats.skipped,
        (Utc::now() - started).num_seconds()
    );
    Ok(stats)
}

/// Apply JSON-line change records from `input` through `sink`.
pub async fn run_destination<R, S>(
    input: R,
    sink: &S,
    on_error: OnError,
    cancel: &CancellationToken,
) -> anyhow::Result<PipelineStats>
where
    R: AsyncRead + Unpin + Send,
    S: ChangeSink,
{
    let mut lines = FramedRead::new(input, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    let mut stats = PipelineStats::default();
    let mut line_number = 0u64;

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = lines.next() => next,
        };
        let Some(line) = next else { break };
        let line = line.context("Failed to read input")?;
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }

        let (is_data_error, error) = match serde_json::from_str::<ChangeRecord>(&line) {
            Ok(record) => match sink.apply_change(&record).await {
                Ok(()) => {
                    stats.records += 1;
                    continue;
                }
                Err(e) => (e.is_data_error(), anyhow::Error::from(e)),
            },
            Err(e) => (true, anyhow::Error::from(e).context("Malformed change record")),
        };

        if is_data_error && on_error == OnError::Skip {
            warn!("Skipping line {line_number}: {error:#}");
            stats.skipped += 1;
        } else {
            return Err(error.context(format!("Failed at input line {line_number}")));
        }
    }

    info!(
        "Applied {} records ({} skipped)",
        stats.records, stats.skipped
    );
    Ok(stats)
}
