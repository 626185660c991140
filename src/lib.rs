// Core infrastructure modules
pub mod core;

// Connection handle and its configuration
pub mod config;
pub mod handle;

// Test doubles
pub mod testing;

pub use config::HandleConfig;
pub use handle::{ConnectionHandle, ConnectionState};
