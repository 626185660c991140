/// Database Driver Module
///
/// This module defines the seam between the connection handle and the
/// database driver doing the actual work.
///
/// ## Architecture
///
/// - **Driver traits** (this file): `Driver` opens connections, `Connection`
///   runs queries and closes, `ConnectionObserver` receives lifecycle events
/// - **Query terms** (`query.rs`): the queries a connection understands and the
///   `Cursor` their results come back in
/// - **SQLite driver** (`sqlite.rs`): a concrete driver storing each logical
///   database as a SQLite file
///
/// ## Error Handling
///
/// Driver operations return `HandleError`. Whether an error reaches the
/// handle's caller is decided by the handle, not the driver.
pub mod query;
pub mod sqlite;

pub use query::*;
pub use sqlite::SqliteDriver;

use crate::core::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Parameters a driver needs to establish a connection
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Default logical database for the new connection
    pub db: Option<String>,
    /// How long the driver may wait while connecting or on a busy resource
    pub timeout: Duration,
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("db", &self.db)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Options accepted by `Connection::close`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseOptions {
    /// Wait for outstanding no-reply writes before closing
    pub noreply_wait: bool,
}

impl Default for CloseOptions {
    fn default() -> Self {
        CloseOptions { noreply_wait: true }
    }
}

/// Lifecycle events a live connection may emit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The connection (re)established its session
    Connect,
    /// The connection hit an error outside of a direct call
    Error(String),
    /// An operation on the connection timed out
    Timeout,
    /// The connection was closed
    Close,
}

impl fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionEvent::Connect => write!(f, "connect"),
            ConnectionEvent::Error(msg) => write!(f, "error: {}", msg),
            ConnectionEvent::Timeout => write!(f, "timeout"),
            ConnectionEvent::Close => write!(f, "close"),
        }
    }
}

/// Receives lifecycle events from a connection.
///
/// Observers are called synchronously from whatever context emits the event
/// and must not block.
pub trait ConnectionObserver: Send + Sync {
    fn on_event(&self, event: &ConnectionEvent);
}

/// Opens connections to a database server
#[async_trait]
pub trait Driver: Send + Sync {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn Connection>>;
}

/// A live connection produced by a `Driver`
#[async_trait]
pub trait Connection: Send + Sync {
    /// Closes the connection, optionally waiting for no-reply writes
    async fn close(&mut self, options: CloseOptions) -> Result<()>;

    /// Switches the default logical database for subsequent queries
    fn use_database(&mut self, name: &str) -> Result<()>;

    /// Runs a query and returns a cursor over its results
    async fn run(&self, query: &Query) -> Result<Cursor>;

    /// Registers an observer for lifecycle events
    fn subscribe(&mut self, observer: Arc<dyn ConnectionObserver>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_params_debug_redacts_password() {
        let params = ConnectParams {
            host: "localhost".to_string(),
            port: 28015,
            user: "admin".to_string(),
            password: "hunter2".to_string(),
            db: None,
            timeout: Duration::from_secs(20),
        };
        let rendered = format!("{:?}", params);
        assert!(rendered.contains("localhost"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_close_options_default_waits() {
        assert!(CloseOptions::default().noreply_wait);
    }

    #[test]
    fn test_event_display() {
        assert_eq!(ConnectionEvent::Close.to_string(), "close");
        assert_eq!(
            ConnectionEvent::Error("broken pipe".to_string()).to_string(),
            "error: broken pipe"
        );
    }
}
