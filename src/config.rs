use crate::core::{HandleError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 28015;
pub const DEFAULT_USER: &str = "admin";
pub const DEFAULT_PASSWORD: &str = "password";
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: HandleConfig,
    pub sqlite: Option<SqliteConfig>,
}

/// Connection parameters of a `ConnectionHandle`.
///
/// Every field has a default, and keys this struct doesn't know are ignored.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HandleConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Database selected at construction
    pub db: Option<String>,
    /// Connect and busy timeout handed to the driver
    pub timeout_secs: u64,
}

impl Default for HandleConfig {
    fn default() -> Self {
        HandleConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            user: DEFAULT_USER.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            db: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl std::fmt::Debug for HandleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("db", &self.db)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl HandleConfig {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn with_db(mut self, db: impl Into<String>) -> Self {
        self.db = Some(db.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// SQLite driver configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteConfig {
    /// Directory holding one `<name>.sqlite` file per logical database
    pub data_dir: PathBuf,
}

/// Loads configuration from a TOML file at the given path.
///
/// # Arguments
///
/// * `path` - The file path to the TOML configuration file.
///
/// # Example
///
/// ```no_run
/// let config = dbhandle::config::load_config("config.toml").expect("Failed to load config");
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    debug!("Loading configuration from {}", path.display());
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)?;
    if config.connection.port == 0 {
        return Err(HandleError::Config("port must be non-zero".to_string()));
    }
    Ok(config)
}

/// `<config dir>/dbhandle/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("dbhandle").join("config.toml"))
}
