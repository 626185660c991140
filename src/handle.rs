/// Connection Handle Module
///
/// `ConnectionHandle` owns at most one driver connection and mediates its
/// lifecycle (open, close, database switch) and two read paths (table
/// listing and queries).
///
/// ## Error Handling
///
/// Failures are reported through the handle's `Logger`, not returned:
/// `open`, `close`, `force_close` and `use_database` return nothing, while
/// `table_list` and `select` return `None` on failure. A missing database
/// selection makes `table_list` and `read` return the `None` sentinel.
///
/// `read` is the exception: a failing query is returned to the caller as
/// `Err`. Callers that want to distinguish "no rows" from "query failed"
/// should use `read`.

use crate::config::HandleConfig;
use crate::core::db::{
    CloseOptions, Connection, ConnectionEvent, ConnectionObserver, ConnectParams, Driver, Query,
    Row,
};
use crate::core::{HandleError, Logger, Result, TracingLogger};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Lifecycle of the connection owned by a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection has been opened yet
    Unopened,
    /// A connection is open
    Open,
    /// The last connection was closed
    Closed,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Unopened
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Unopened => write!(f, "unopened"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Logs connection lifecycle events. Holds no reference to the handle, so
/// events can never change handle state.
struct LifecycleLogger {
    logger: Arc<dyn Logger>,
}

impl ConnectionObserver for LifecycleLogger {
    fn on_event(&self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Error(msg) => {
                self.logger.error(&format!("Connection error: {}", msg));
                self.logger.debug(&format!("{:?}", event));
            }
            ConnectionEvent::Connect => self.logger.info("Connection established"),
            ConnectionEvent::Timeout => self.logger.error("Connection timed out"),
            ConnectionEvent::Close => self.logger.info("Connection closed"),
        }
    }
}

/// Owner of a single database connection
pub struct ConnectionHandle {
    config: HandleConfig,
    selected_database: Option<String>,
    state: ConnectionState,
    connection: Option<Box<dyn Connection>>,
    driver: Arc<dyn Driver>,
    logger: Arc<dyn Logger>,
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("config", &self.config)
            .field("selected_database", &self.selected_database)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ConnectionHandle {
    /// Creates a handle; nothing is opened until `open` is called.
    ///
    /// # Arguments
    ///
    /// * `driver` - Driver used to open connections
    /// * `config` - Connection parameters; `config.db` becomes the selected database
    /// * `logger` - Logger for all handle output, or `None` for a new `TracingLogger`
    pub fn new(
        driver: Arc<dyn Driver>,
        config: HandleConfig,
        logger: Option<Arc<dyn Logger>>,
    ) -> Self {
        let logger = logger.unwrap_or_else(|| Arc::new(TracingLogger::new()));
        ConnectionHandle {
            selected_database: config.db.clone(),
            config,
            state: ConnectionState::Unopened,
            connection: None,
            driver,
            logger,
        }
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn user(&self) -> &str {
        &self.config.user
    }

    pub fn config(&self) -> &HandleConfig {
        &self.config
    }

    pub fn selected_database(&self) -> Option<&str> {
        self.selected_database.as_deref()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    fn connect_params(&self) -> ConnectParams {
        ConnectParams {
            host: self.config.host.clone(),
            port: self.config.port,
            user: self.config.user.clone(),
            password: self.config.password.clone(),
            db: self.selected_database.clone(),
            timeout: self.config.timeout(),
        }
    }

    fn log_failure(&self, error: &HandleError) {
        self.logger.error(&format!("Error: {}", error));
        self.logger.debug(&format!("{:?}", error));
    }

    /// Opens a connection. Failures are logged and leave the state unchanged.
    ///
    /// Opening while a connection is already open replaces it.
    pub async fn open(&mut self) {
        self.logger.info("Try connect to database");
        if self.connection.is_some() {
            self.logger.warn("Connection already open, replacing it");
        }

        match self.driver.connect(&self.connect_params()).await {
            Ok(mut conn) => {
                conn.subscribe(Arc::new(LifecycleLogger {
                    logger: self.logger.clone(),
                }));
                self.connection = Some(conn);
                self.state = ConnectionState::Open;
                self.logger.info("Connected");
            }
            Err(e) => self.log_failure(&e),
        }
    }

    /// Closes the connection; `wait` waits for outstanding no-reply writes.
    /// Failures are logged.
    pub async fn close(&mut self, wait: bool) {
        let Some(conn) = self.connection.as_mut() else {
            self.log_failure(&HandleError::NotConnected);
            return;
        };

        match conn.close(CloseOptions { noreply_wait: wait }).await {
            Ok(()) => {
                self.connection = None;
                self.state = ConnectionState::Closed;
                self.logger.info("Disconnected");
            }
            Err(e) => self.log_failure(&e),
        }
    }

    /// Closes without waiting for outstanding writes
    pub async fn force_close(&mut self) {
        self.close(false).await;
    }

    /// Switches the default database and confirms it exists.
    ///
    /// The selection changes only once the driver returns metadata for
    /// `name`. A failed confirmation does not undo the driver-level switch.
    pub async fn use_database(&mut self, name: &str) {
        let Some(conn) = self.connection.as_mut() else {
            self.log_failure(&HandleError::NotConnected);
            return;
        };

        match switch_database(&mut **conn, name).await {
            Ok(info) => {
                self.selected_database = Some(name.to_string());
                self.logger.info(&format!("Using database {}", name));
                self.logger.debug(&info.to_string());
            }
            Err(e) => self.log_failure(&e),
        }
    }

    /// Names of the tables in the selected database.
    ///
    /// Returns `None` without a selected database or when the query fails.
    pub async fn table_list(&self) -> Option<Vec<String>> {
        let Some(database) = self.selected_database.as_deref() else {
            self.logger.error("No database selected");
            return None;
        };

        match self.fetch(&Query::db(database).table_list()).await.and_then(table_names) {
            Ok(names) => Some(names),
            Err(e) => {
                self.log_failure(&e);
                None
            }
        }
    }

    /// Runs a pre-built query and collects every row.
    ///
    /// Failures are logged twice at error level (message, then the raw
    /// error) and yield `None`.
    pub async fn select(&self, query: &Query) -> Option<Vec<Row>> {
        match self.fetch(query).await {
            Ok(rows) => Some(rows),
            Err(e) => {
                self.logger.error(&format!("Error: {}", e));
                self.logger.error(&format!("{:?}", e));
                None
            }
        }
    }

    /// Reads up to `limit` rows of `table` in the selected database; a
    /// `limit` of zero reads every row.
    ///
    /// Returns `Ok(None)` without a selected database. Unlike the other
    /// operations a failing query is returned as `Err`.
    pub async fn read(&self, table: &str, limit: u64) -> Result<Option<Vec<Row>>> {
        let Some(database) = self.selected_database.as_deref() else {
            self.logger.error("No database selected");
            return Ok(None);
        };

        let rows = self.fetch(&Query::read(database, table, limit)).await?;
        Ok(Some(rows))
    }

    /// `read(table, 0)`
    pub async fn read_all(&self, table: &str) -> Result<Option<Vec<Row>>> {
        self.read(table, 0).await
    }

    async fn fetch(&self, query: &Query) -> Result<Vec<Row>> {
        let conn = self.connection.as_ref().ok_or(HandleError::NotConnected)?;
        conn.run(query).await?.to_array()
    }
}

async fn switch_database(conn: &mut dyn Connection, name: &str) -> Result<Value> {
    conn.use_database(name)?;
    let mut info = conn.run(&Query::db(name).info()).await?.to_array()?;
    if info.is_empty() {
        return Err(HandleError::UnexpectedValue(format!(
            "no metadata returned for database {}",
            name
        )));
    }
    Ok(info.swap_remove(0))
}

fn table_names(rows: Vec<Row>) -> Result<Vec<String>> {
    rows.into_iter()
        .map(|row| match row {
            Value::String(name) => Ok(name),
            other => Err(HandleError::UnexpectedValue(format!(
                "table name {} is not a string",
                other
            ))),
        })
        .collect()
}
