/// # Test Utilities Module
///
/// Test doubles for code built on the connection handle:
/// - `MockDriver`: an in-memory driver that records every call, can be told
///   to fail at any step and can emit lifecycle events on demand
/// - `RecordingLogger`: a `Logger` that keeps every message with its level

use crate::core::db::{
    CloseOptions, Connection, ConnectionEvent, ConnectionObserver, ConnectParams, Cursor, Driver,
    Query, Row,
};
use crate::core::{HandleError, Logger, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard};

/// Which driver steps a `MockDriver` fails
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockBehavior {
    pub fail_connect: bool,
    pub fail_close: bool,
    pub fail_use: bool,
    pub fail_info: bool,
    pub fail_table_list: bool,
    /// Fails table scans and raw statements
    pub fail_query: bool,
}

/// Everything a `MockDriver` was asked to do, in order per kind
#[derive(Debug, Clone, Default)]
pub struct MockCalls {
    pub connects: Vec<ConnectParams>,
    pub closes: Vec<CloseOptions>,
    pub uses: Vec<String>,
    pub queries: Vec<Query>,
}

#[derive(Default)]
struct MockState {
    behavior: MockBehavior,
    tables: Vec<String>,
    rows: Vec<Row>,
    calls: MockCalls,
    observers: Vec<Arc<dyn ConnectionObserver>>,
}

/// In-memory driver for tests. Clones share state, so a test can keep one
/// clone for assertions and hand another to the code under test.
#[derive(Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table names returned by `table_list` queries
    pub fn with_tables(self, tables: &[&str]) -> Self {
        self.lock().tables = tables.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Rows returned by table scans and raw statements
    pub fn with_rows(self, rows: Vec<Row>) -> Self {
        self.lock().rows = rows;
        self
    }

    /// Adjusts which steps fail
    pub fn configure(&self, f: impl FnOnce(&mut MockBehavior)) {
        f(&mut self.lock().behavior);
    }

    pub fn calls(&self) -> MockCalls {
        self.lock().calls.clone()
    }

    /// Delivers `event` to every observer subscribed to any connection
    pub fn emit(&self, event: ConnectionEvent) {
        let observers = self.lock().observers.clone();
        for observer in observers {
            observer.on_event(&event);
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A poisoned lock only happens after a test already panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn Connection>> {
        let mut state = self.lock();
        state.calls.connects.push(params.clone());
        if state.behavior.fail_connect {
            return Err(HandleError::Driver("connection refused".to_string()));
        }
        Ok(Box::new(MockConnection {
            state: self.state.clone(),
            open: true,
        }))
    }
}

/// Connection handed out by `MockDriver`
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
    open: bool,
}

impl MockConnection {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn close(&mut self, options: CloseOptions) -> Result<()> {
        {
            let mut state = self.lock();
            state.calls.closes.push(options);
            if state.behavior.fail_close {
                return Err(HandleError::Driver("close failed".to_string()));
            }
            if !self.open {
                return Err(HandleError::NotConnected);
            }
        }
        self.open = false;
        Ok(())
    }

    fn use_database(&mut self, name: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.uses.push(name.to_string());
        if state.behavior.fail_use {
            return Err(HandleError::Driver(format!("cannot use {}", name)));
        }
        Ok(())
    }

    async fn run(&self, query: &Query) -> Result<Cursor> {
        let mut state = self.lock();
        state.calls.queries.push(query.clone());
        if !self.open {
            return Err(HandleError::NotConnected);
        }

        match query {
            Query::Info { database } => {
                if state.behavior.fail_info {
                    return Err(HandleError::DatabaseNotFound(database.clone()));
                }
                Ok(Cursor::from_rows(vec![json!({
                    "name": database,
                    "type": "DB",
                })]))
            }
            Query::TableList { .. } => {
                if state.behavior.fail_table_list {
                    return Err(HandleError::Driver("table list failed".to_string()));
                }
                Ok(Cursor::from_rows(
                    state.tables.iter().cloned().map(Value::String).collect(),
                ))
            }
            Query::Table { limit, .. } => {
                if state.behavior.fail_query {
                    return Err(HandleError::Driver("query failed".to_string()));
                }
                let mut rows = state.rows.clone();
                if let Some(n) = limit {
                    rows.truncate(*n as usize);
                }
                Ok(Cursor::from_rows(rows))
            }
            Query::Sql { .. } => {
                if state.behavior.fail_query {
                    return Err(HandleError::Driver("query failed".to_string()));
                }
                Ok(Cursor::from_rows(state.rows.clone()))
            }
        }
    }

    fn subscribe(&mut self, observer: Arc<dyn ConnectionObserver>) {
        self.lock().observers.push(observer);
    }
}

/// Severity of a recorded log message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

/// Logger that records messages for later assertions
#[derive(Debug, Default)]
pub struct RecordingLogger {
    entries: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    /// Messages logged at `level`, oldest first
    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.messages(level).len()
    }

    fn record(&self, level: LogLevel, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((level, message.to_string()));
        }
    }
}

impl Logger for RecordingLogger {
    fn info(&self, message: &str) {
        self.record(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.record(LogLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.record(LogLevel::Error, message);
    }

    fn debug(&self, message: &str) {
        self.record(LogLevel::Debug, message);
    }
}
