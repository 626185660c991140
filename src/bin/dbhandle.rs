use clap::{Parser, Subcommand};
use dbhandle::config::{self, Config};
use dbhandle::core::db::{Query, Row, SqliteDriver};
use dbhandle::core::Result;
use dbhandle::ConnectionHandle;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// Inspect SQLite-backed logical databases through a connection handle.
#[derive(Debug, Parser)]
#[command(name = "dbhandle", version, about)]
struct Cli {
    /// Configuration file (defaults to <config dir>/dbhandle/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding one <name>.sqlite file per database
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    user: Option<String>,

    #[arg(long)]
    password: Option<String>,

    /// Database to select before running the command
    #[arg(long)]
    db: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the tables of the selected database
    Tables,
    /// Print rows of a table as JSON lines
    Read {
        table: String,
        /// Maximum number of rows; 0 reads every row
        #[arg(long, default_value_t = 0)]
        limit: u64,
    },
    /// Run a SQL statement and print its rows as JSON lines
    Query { statement: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so stdout only carries results
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn load(cli: &Cli) -> Result<Config> {
    if let Some(path) = &cli.config {
        return config::load_config(path);
    }
    match config::default_config_path() {
        Some(path) if path.is_file() => config::load_config(path),
        _ => {
            debug!("No configuration file, using defaults");
            Ok(Config::default())
        }
    }
}

/// Returns `Ok(false)` when the command produced no result
async fn run(cli: Cli) -> Result<bool> {
    let loaded = load(&cli)?;

    let mut handle_config = loaded.connection;
    if let Some(host) = &cli.host {
        handle_config = handle_config.with_host(host.as_str());
    }
    if let Some(port) = cli.port {
        handle_config = handle_config.with_port(port);
    }
    if let Some(user) = &cli.user {
        handle_config = handle_config.with_user(user.as_str());
    }
    if let Some(password) = &cli.password {
        handle_config = handle_config.with_password(password.as_str());
    }
    if let Some(db) = &cli.db {
        handle_config = handle_config.with_db(db.as_str());
    }

    let data_dir = cli
        .data_dir
        .clone()
        .or_else(|| loaded.sqlite.map(|s| s.data_dir))
        .unwrap_or_else(|| PathBuf::from("."));

    let driver = Arc::new(SqliteDriver::new(data_dir));
    let mut handle = ConnectionHandle::new(driver, handle_config, None);

    handle.open().await;
    if !handle.is_open() {
        return Ok(false);
    }
    if let Some(db) = handle.selected_database().map(String::from) {
        handle.use_database(&db).await;
    }

    let outcome = match cli.command {
        Command::Tables => handle.table_list().await.map(|names| {
            for name in names {
                println!("{}", name);
            }
        }),
        Command::Read { table, limit } => match handle.read(&table, limit).await {
            Ok(rows) => rows.map(|rows| print_rows(&rows)),
            Err(e) => {
                handle.close(true).await;
                return Err(e);
            }
        },
        Command::Query { statement } => handle
            .select(&Query::sql(statement))
            .await
            .map(|rows| print_rows(&rows)),
    };

    handle.close(true).await;
    Ok(outcome.is_some())
}

fn print_rows(rows: &[Row]) {
    for row in rows {
        println!("{}", row);
    }
}
