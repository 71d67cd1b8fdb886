//! Configuration assembly for the CLI.
//!
//! Keys come from an optional TOML/YAML file first; flags and environment
//! variables override them. The merged `key -> string` map is then validated
//! once by `sync_core`.

use crate::{SourceOpts, TableOpts};
use anyhow::{bail, Context};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use sync_core::config::{
    KEY_BATCH_SIZE, KEY_COLUMNS, KEY_CONNECTION, KEY_ORDERING_COLUMN, KEY_POLL_INTERVAL,
    KEY_PRIMARY_KEY, KEY_PRUNE_TRACKING, KEY_TABLE,
};
use sync_core::{Config, SourceConfig};

pub type RawConfig = HashMap<String, String>;

/// Read a flat configuration file. The format follows the extension.
pub fn load_file(path: &Path) -> anyhow::Result<RawConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {path:?}"))?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let document: serde_json::Map<String, Value> = match extension.as_deref() {
        Some("toml") => toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config {path:?}"))?,
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML config {path:?}"))?,
        _ => bail!("Unsupported config file {path:?}: expected .toml, .yaml or .yml"),
    };

    document
        .into_iter()
        .map(|(key, value)| {
            let text = flatten(&value)
                .with_context(|| format!("Config key '{key}' in {path:?} must be a scalar or a list"))?;
            Ok((key, text))
        })
        .collect()
}

fn flatten(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => items
            .iter()
            .map(flatten)
            .collect::<Option<Vec<_>>>()
            .map(|items| items.join(",")),
        Value::Null | Value::Object(_) => None,
    }
}

/// Merge the config file with flag/environment values.
pub fn raw_config(table: &TableOpts, source: Option<&SourceOpts>) -> anyhow::Result<RawConfig> {
    let mut raw = match &table.config {
        Some(path) => load_file(path)?,
        None => RawConfig::new(),
    };

    let mut set = |key: &str, value: &Option<String>| {
        if let Some(value) = value {
            raw.insert(key.to_string(), value.clone());
        }
    };
    set(KEY_CONNECTION, &table.connection);
    set(KEY_TABLE, &table.table);
    set(KEY_PRIMARY_KEY, &table.primary_key);
    if let Some(source) = source {
        set(KEY_COLUMNS, &source.columns);
        set(KEY_ORDERING_COLUMN, &source.ordering_column);
        set(KEY_BATCH_SIZE, &source.batch_size);
        set(KEY_POLL_INTERVAL, &source.poll_interval);
        set(KEY_PRUNE_TRACKING, &source.prune_tracking);
    }
    Ok(raw)
}

pub fn destination_config(table: &TableOpts) -> anyhow::Result<Config> {
    let raw = raw_config(table, None)?;
    Config::parse(&raw).context("Invalid destination configuration")
}

pub fn source_config(table: &TableOpts, source: &SourceOpts) -> anyhow::Result<SourceConfig> {
    let raw = raw_config(table, Some(source))?;
    SourceConfig::parse(&raw).context("Invalid source configuration")
}

/// clap value parser for duration flags.
pub fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    sync_core::config::parse_duration(s)
        .ok_or_else(|| format!("invalid duration '{s}' (expected e.g. 500ms, 30s, 5m, 1h)"))
}
