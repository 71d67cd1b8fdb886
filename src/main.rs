//! Command-line interface for db2-sync
//!
//! # Usage Examples
//!
//! ## Provisioning
//! ```bash
//! # Show what would be created, no database needed
//! db2-sync ddl --table CLIENTS --column ID=INTEGER --column NAME=VARCHAR(40)
//!
//! # Create the tracking table and triggers
//! db2-sync provision --connection "$DB2_CONNECTION" --table CLIENTS --primary-key ID
//! ```
//!
//! ## Streaming
//! ```bash
//! # Snapshot then stream changes as JSON lines
//! db2-sync source --config clients.toml --output changes.jsonl
//!
//! # Apply JSON lines to a destination table, skipping bad records
//! db2-sync destination --config archive.toml --input changes.jsonl --on-error skip
//!
//! # Both in one process
//! db2-sync sync --config clients.toml --to-table CLIENTS_COPY
//! ```
//!
//! ## Checkpoint Formats
//! - CDC: `cdc:<tracking id>`
//! - Snapshot: the JSON position document stored in the checkpoint file

use anyhow::Context;
use clap::{Parser, Subcommand};
use db2_client::{sanitize_connection_string, CatalogColumnTypes, ColumnTypeService, Connection};
use db2_sink::Writer;
use db2_sync::config::{destination_config, parse_duration_arg, raw_config, source_config};
use db2_sync::pipeline::{
    run_changes, run_destination, starting_position, JsonLinesOutput, OnError, PipelineOpts,
    SinkOutput,
};
use db2_sync::{CheckpointOpts, SourceOpts, TableOpts};
use db2_sync_trigger_source::{
    provisioning_statements, setup_change_tracking, teardown_change_tracking, Db2Iterator,
};
use db2_types::{ColumnTypes, Db2Type};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sync_core::config::{DESTINATION_FIELDS, SOURCE_FIELDS};
use sync_core::Config;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "db2-sync")]
#[command(about = "Trigger-based change data capture for IBM DB2")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the configuration fields as JSON
    Spec,

    /// Print the provisioning statements for a table
    Ddl {
        /// Source table
        #[arg(long)]
        table: String,

        /// Source column as NAME=TYPE (e.g. ID=INTEGER, NAME=VARCHAR(40)); repeatable
        #[arg(long = "column", value_name = "NAME=TYPE", required = true)]
        columns: Vec<String>,
    },

    /// Create the tracking table and triggers
    Provision {
        #[command(flatten)]
        table: TableOpts,
    },

    /// Drop the tracking table and triggers
    Teardown {
        #[command(flatten)]
        table: TableOpts,
    },

    /// Stream snapshot and change records as JSON lines
    Source {
        #[command(flatten)]
        table: TableOpts,

        #[command(flatten)]
        source: SourceOpts,

        #[command(flatten)]
        checkpoint: CheckpointOpts,

        #[command(flatten)]
        run: RunOpts,

        /// Write records here instead of stdout
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Apply JSON-line change records to a table
    Destination {
        #[command(flatten)]
        table: TableOpts,

        /// Read records from here instead of stdin
        #[arg(long, value_name = "PATH")]
        input: Option<PathBuf>,

        /// What to do with records that cannot be applied
        #[arg(long, value_enum, default_value_t = OnError::Abort)]
        on_error: OnError,
    },

    /// Copy snapshot and changes from one table to another
    Sync {
        #[command(flatten)]
        table: TableOpts,

        #[command(flatten)]
        source: SourceOpts,

        #[command(flatten)]
        checkpoint: CheckpointOpts,

        #[command(flatten)]
        run: RunOpts,

        /// Destination connection string (defaults to the source connection)
        #[arg(long, env = "DB2_TO_CONNECTION")]
        to_connection: Option<String>,

        /// Destination table (defaults to the source table)
        #[arg(long, env = "DB2_TO_TABLE")]
        to_table: Option<String>,

        /// Destination key column (defaults to the source key)
        #[arg(long, env = "DB2_TO_PRIMARY_KEY")]
        to_primary_key: Option<String>,
    },
}

#[derive(clap::Args, Clone, Debug)]
struct RunOpts {
    /// What to do with records that cannot be read or applied
    #[arg(long, value_enum, default_value_t = OnError::Abort)]
    on_error: OnError,

    /// Exit once the snapshot is done and the tracking table is drained
    #[arg(long)]
    exit_when_caught_up: bool,

    /// Stop after this long (e.g. `30s`, `10m`)
    #[arg(long, value_parser = parse_duration_arg)]
    timeout: Option<Duration>,
}

impl RunOpts {
    fn pipeline(&self) -> PipelineOpts {
        PipelineOpts {
            on_error: self.on_error,
            exit_when_caught_up: self.exit_when_caught_up,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Spec => {
            let fields = serde_json::json!({
                "destination": DESTINATION_FIELDS,
                "source": SOURCE_FIELDS,
            });
            println!("{}", serde_json::to_string_pretty(&fields)?);
        }
        Commands::Ddl { table, columns } => {
            let types = parse_columns(&columns)?;
            for (step, sql) in provisioning_statements(&table, &types)? {
                println!("-- {step}\n{sql};\n");
            }
        }
        Commands::Provision { table } => {
            let config = destination_config(&table)?;
            let conn = connect(&config.connection).await?;
            let column_types = CatalogColumnTypes::new(conn.clone());
            setup_change_tracking(conn.as_ref(), &column_types, &config.table).await?;
            conn.close().await?;
        }
        Commands::Teardown { table } => {
            let config = destination_config(&table)?;
            let conn = connect(&config.connection).await?;
            teardown_change_tracking(conn.as_ref(), &config.table).await?;
            conn.close().await?;
        }
        Commands::Source {
            table,
            source,
            checkpoint,
            run,
            output,
        } => {
            let cancel = cancellation(run.timeout);
            let (conn, mut iterator, manager) = open_source(&table, &source, &checkpoint).await?;

            match output {
                Some(path) => {
                    let file = tokio::fs::File::create(&path)
                        .await
                        .with_context(|| format!("Failed to create output file {path:?}"))?;
                    let mut handler = JsonLinesOutput::new(file);
                    run_changes(&mut iterator, &mut handler, Some(&manager), run.pipeline(), &cancel)
                        .await?;
                }
                None => {
                    let mut handler = JsonLinesOutput::new(tokio::io::stdout());
                    run_changes(&mut iterator, &mut handler, Some(&manager), run.pipeline(), &cancel)
                        .await?;
                }
            }
            conn.close().await?;
        }
        Commands::Destination {
            table,
            input,
            on_error,
        } => {
            let cancel = cancellation(None);
            let config = destination_config(&table)?;
            let writer = open_writer(config).await?;

            let stats = match input {
                Some(path) => {
                    let file = tokio::fs::File::open(&path)
                        .await
                        .with_context(|| format!("Failed to open input file {path:?}"))?;
                    run_destination(file, &writer, on_error, &cancel).await?
                }
                None => run_destination(tokio::io::stdin(), &writer, on_error, &cancel).await?,
            };
            tracing::info!("Destination finished: {stats:?}");
            writer.close().await?;
        }
        Commands::Sync {
            table,
            source,
            checkpoint,
            run,
            to_connection,
            to_table,
            to_primary_key,
        } => {
            let cancel = cancellation(run.timeout);
            let (conn, mut iterator, manager) = open_source(&table, &source, &checkpoint).await?;

            let mut raw = raw_config(&table, Some(&source))?;
            for (key, value) in [
                ("connection", to_connection),
                ("table", to_table),
                ("primaryKey", to_primary_key),
            ] {
                if let Some(value) = value {
                    raw.insert(key.to_string(), value);
                }
            }
            let config = Config::parse(&raw).context("Invalid destination configuration")?;
            let writer = open_writer(config).await?;

            let mut handler = SinkOutput::new(&writer, run.on_error);
            run_changes(&mut iterator, &mut handler, Some(&manager), run.pipeline(), &cancel).await?;

            writer.close().await?;
            conn.close().await?;
        }
    }

    Ok(())
}

/// Parse repeated `NAME=TYPE` column flags.
fn parse_columns(columns: &[String]) -> anyhow::Result<ColumnTypes> {
    columns
        .iter()
        .map(|column| {
            let (name, ty) = column
                .split_once('=')
                .with_context(|| format!("Invalid column '{column}', expected NAME=TYPE"))?;
            let ty: Db2Type = ty
                .parse()
                .with_context(|| format!("Invalid type for column '{name}'"))?;
            Ok((name.trim().to_string(), ty))
        })
        .collect()
}

async fn connect(connection: &str) -> anyhow::Result<Arc<dyn Connection>> {
    db2_client::connect(connection)
        .await
        .with_context(|| format!("Failed to connect to {}", sanitize_connection_string(connection)))
}

/// Connect, provision change tracking and position a new iterator.
async fn open_source(
    table: &TableOpts,
    source: &SourceOpts,
    checkpoint_opts: &CheckpointOpts,
) -> anyhow::Result<(Arc<dyn Connection>, Db2Iterator, checkpoint::SyncManager)> {
    let config = source_config(table, source)?;
    let conn = connect(&config.config.connection).await?;
    let column_types = CatalogColumnTypes::new(conn.clone());

    setup_change_tracking(conn.as_ref(), &column_types, &config.config.table).await?;

    let store = checkpoint::FilesystemStore::new(&checkpoint_opts.checkpoint_dir);
    let manager = checkpoint::SyncManager::new(Box::new(store), &config.config.table);
    let position = starting_position(
        conn.as_ref(),
        &manager,
        checkpoint_opts.from_checkpoint.as_deref(),
        checkpoint_opts.from_current,
    )
    .await?;

    let iterator = Db2Iterator::new(conn.clone(), &column_types, config, position).await?;
    Ok((conn, iterator, manager))
}

async fn open_writer(config: Config) -> anyhow::Result<Writer> {
    let conn = connect(&config.connection).await?;
    let column_types: Arc<dyn ColumnTypeService> = Arc::new(CatalogColumnTypes::new(conn.clone()));
    Ok(Writer::new(conn, column_types, config))
}

/// Token cancelled on Ctrl-C or after `timeout`.
fn cancellation(timeout: Option<Duration>) -> CancellationToken {
    let cancel = CancellationToken::new();

    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, stopping after the current batch");
            on_signal.cancel();
        }
    });

    if let Some(timeout) = timeout {
        let on_timeout = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            tracing::info!("Timeout of {timeout:?} reached, stopping");
            on_timeout.cancel();
        });
    }

    cancel
}
