//! Scripted in-memory [`Connection`] for tests.
//!
//! Responses are matched by SQL substring, first registered rule first.
//! Queries without a matching rule return no rows and statements without
//! a matching rule affect zero rows. Every call is recorded.

use crate::{ClientError, ColumnTypeService, Connection};
use async_trait::async_trait;
use db2_types::{ColumnTypes, Db2Value, Row};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type QueryFn = Box<dyn Fn(&str, &[Db2Value]) -> Result<Vec<Row>, ClientError> + Send + Sync>;
type ExecuteFn = Box<dyn Fn(&str, &[Db2Value]) -> Result<u64, ClientError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Query,
    Execute,
}

/// A recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub sql: String,
    pub params: Vec<Db2Value>,
}

#[derive(Default)]
struct State {
    statements: Vec<Statement>,
    queries: Vec<(String, QueryFn)>,
    executes: Vec<(String, ExecuteFn)>,
    failures: Vec<(String, ClientError)>,
    closed: bool,
}

#[derive(Default)]
pub struct FakeConnection {
    state: Mutex<State>,
}

impl FakeConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer queries containing `pattern` with fixed rows.
    pub fn on_query(&self, pattern: &str, rows: Vec<Row>) {
        self.on_query_fn(pattern, move |_, _| Ok(rows.clone()));
    }

    /// Answer queries containing `pattern` by calling `f`.
    pub fn on_query_fn<F>(&self, pattern: &str, f: F)
    where
        F: Fn(&str, &[Db2Value]) -> Result<Vec<Row>, ClientError> + Send + Sync + 'static,
    {
        self.lock().queries.push((pattern.to_string(), Box::new(f)));
    }

    /// Handle statements containing `pattern` by calling `f`.
    pub fn on_execute_fn<F>(&self, pattern: &str, f: F)
    where
        F: Fn(&str, &[Db2Value]) -> Result<u64, ClientError> + Send + Sync + 'static,
    {
        self.lock().executes.push((pattern.to_string(), Box::new(f)));
    }

    /// Fail every query or statement containing `pattern`.
    pub fn fail_on(&self, pattern: &str, error: ClientError) {
        self.lock().failures.push((pattern.to_string(), error));
    }

    /// Remove all failure rules.
    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.lock().statements.clone()
    }

    /// SQL text of every recorded call, in order.
    pub fn sql_log(&self) -> Vec<String> {
        self.lock()
            .statements
            .iter()
            .map(|s| s.sql.clone())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.lock().statements.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panicking test already failed; keep the state usable for the report.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, kind: StatementKind, sql: &str, params: &[Db2Value]) -> Result<(), ClientError> {
        let mut state = self.lock();
        if state.closed {
            return Err(ClientError::Closed);
        }
        state.statements.push(Statement {
            kind,
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        match state.failures.iter().find(|(p, _)| sql.contains(p.as_str())) {
            Some((_, error)) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Connection for FakeConnection {
    async fn query(&self, sql: &str, params: &[Db2Value]) -> Result<Vec<Row>, ClientError> {
        self.record(StatementKind::Query, sql, params)?;
        let state = self.lock();
        match state.queries.iter().find(|(p, _)| sql.contains(p.as_str())) {
            Some((_, f)) => f(sql, params),
            None => Ok(Vec::new()),
        }
    }

    async fn execute(&self, sql: &str, params: &[Db2Value]) -> Result<u64, ClientError> {
        self.record(StatementKind::Execute, sql, params)?;
        let state = self.lock();
        match state.executes.iter().find(|(p, _)| sql.contains(p.as_str())) {
            Some((_, f)) => f(sql, params),
            None => Ok(0),
        }
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.lock().closed = true;
        Ok(())
    }
}

/// [`ColumnTypeService`] answering from a fixed map and counting lookups.
#[derive(Default)]
pub struct FakeColumnTypes {
    tables: HashMap<String, ColumnTypes>,
    lookups: AtomicUsize,
}

impl FakeColumnTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: &str, types: ColumnTypes) -> Self {
        self.tables.insert(table.to_string(), types);
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ColumnTypeService for FakeColumnTypes {
    async fn column_types(&self, table: &str) -> Result<ColumnTypes, ClientError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.tables.get(table).cloned().unwrap_or_default())
    }
}
