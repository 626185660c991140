/// Core Module for dbhandle
///
/// This module contains the building blocks the connection handle is made
/// of: the error type, the logger capability, and the driver seam with its
/// SQLite implementation.

pub mod db;
pub mod error;
pub mod logger;

// Re-export commonly used types for convenience
pub use error::{HandleError, Result};
pub use logger::{Logger, TracingLogger};
