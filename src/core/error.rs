/// Handle Error Module
///
/// This module defines the error type shared by the connection handle, the
/// driver seam and the configuration layer. Most handle operations log these
/// errors instead of returning them; see `handle::ConnectionHandle` for which
/// ones propagate.
use thiserror::Error;

/// Error type for every fallible operation in the crate.
///
/// This enum covers:
/// - Driver failures (SQLite errors, generic driver messages)
/// - Lifecycle misuse (no open connection, no selected database)
/// - Name validation and missing logical databases
/// - Configuration and file system errors
#[derive(Error, Debug)]
pub enum HandleError {
    /// Errors raised by the SQLite driver
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Errors reported by any other driver implementation
    #[error("Driver error: {0}")]
    Driver(String),

    /// An operation needed a live connection and there was none
    #[error("No open connection")]
    NotConnected,

    /// An operation needed a selected database and there was none
    #[error("No database selected")]
    NoDatabaseSelected,

    /// A database or table name that is not a plain identifier
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// The requested logical database does not exist
    #[error("Database `{0}` does not exist")]
    DatabaseNotFound(String),

    /// The driver returned a value of an unexpected shape
    #[error("Unexpected value: {0}")]
    UnexpectedValue(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Type alias for Result to use HandleError as the error type.
pub type Result<T> = std::result::Result<T, HandleError>;
