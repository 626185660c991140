/// SQLite Driver Module
///
/// A `Driver` backed by SQLite. Each logical database is a file named
/// `<name>.sqlite` inside the driver's data directory. A session is an
/// in-memory SQLite connection that attaches those files on first use under
/// their own schema name, so `db(shop).table(orders)` reads `"shop"."orders"`.
/// Raw statements see only their scoped database (explicit or the session
/// default); every other schema is detached before they run.
///
/// Network parameters (host, port, credentials) have no meaning for SQLite and
/// are only logged.

use crate::core::db::{
    CloseOptions, Connection, ConnectionEvent, ConnectionObserver, ConnectParams, Cursor, Driver,
    Query, Row,
};
use crate::core::{HandleError, Result};
use async_trait::async_trait;
use rusqlite::{params, types::ValueRef, ErrorCode};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// File extension of logical database files
const DATABASE_EXTENSION: &str = "sqlite";

/// Driver opening SQLite sessions over a directory of database files
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    data_dir: PathBuf,
}

impl SqliteDriver {
    /// Creates a driver serving the databases found in `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        SqliteDriver {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the file backing the logical database `name`
    pub fn database_path(&self, name: &str) -> PathBuf {
        database_path(&self.data_dir, name)
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn Connection>> {
        debug!(
            host = %params.host,
            port = params.port,
            user = %params.user,
            "SQLite sessions do not use network parameters"
        );

        if !self.data_dir.is_dir() {
            return Err(HandleError::Config(format!(
                "data directory {} does not exist",
                self.data_dir.display()
            )));
        }

        let conn = rusqlite::Connection::open_in_memory()?;
        conn.busy_timeout(params.timeout)?;

        let mut session = SqliteConnection {
            data_dir: self.data_dir.clone(),
            state: Mutex::new(Session {
                conn: Some(conn),
                default_db: None,
                attached: HashSet::new(),
            }),
            observers: Mutex::new(Vec::new()),
        };

        if let Some(db) = &params.db {
            session.use_database(db)?;
        }

        debug!("Opened SQLite session over {}", self.data_dir.display());
        Ok(Box::new(session))
    }
}

/// Mutable part of a session, guarded by one lock
struct Session {
    /// Underlying connection (None once closed)
    conn: Option<rusqlite::Connection>,
    /// Database used by statements that don't name one
    default_db: Option<String>,
    /// Schema names already attached to `conn`
    attached: HashSet<String>,
}

/// A live SQLite session
pub struct SqliteConnection {
    data_dir: PathBuf,
    state: Mutex<Session>,
    observers: Mutex<Vec<Arc<dyn ConnectionObserver>>>,
}

impl SqliteConnection {
    fn session(&self) -> Result<MutexGuard<'_, Session>> {
        self.state
            .lock()
            .map_err(|_| HandleError::Driver("SQLite session lock poisoned".to_string()))
    }

    fn emit(&self, event: ConnectionEvent) {
        let observers = match self.observers.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => return,
        };
        for observer in observers {
            observer.on_event(&event);
        }
    }

    fn execute(&self, query: &Query) -> Result<Vec<Row>> {
        let mut guard = self.session()?;
        let session = &mut *guard;
        let conn = session.conn.as_ref().ok_or(HandleError::NotConnected)?;

        match query {
            Query::Info { database } => {
                let path = attach(conn, &mut session.attached, &self.data_dir, database)?;
                let tables = table_names(conn, database)?;
                Ok(vec![json!({
                    "name": database,
                    "type": "DB",
                    "file": path.display().to_string(),
                    "tables": tables.len(),
                })])
            }
            Query::TableList { database } => {
                attach(conn, &mut session.attached, &self.data_dir, database)?;
                Ok(table_names(conn, database)?
                    .into_iter()
                    .map(Value::String)
                    .collect())
            }
            Query::Table {
                database,
                table,
                limit,
            } => {
                attach(conn, &mut session.attached, &self.data_dir, database)?;
                validate_identifier(table)?;
                let mut sql = format!(
                    "SELECT * FROM {}.{}",
                    quote_identifier(database),
                    quote_identifier(table)
                );
                if let Some(n) = limit {
                    // SQLite limits are signed 64-bit
                    let n = (*n).min(i64::MAX as u64);
                    sql.push_str(&format!(" LIMIT {}", n));
                }
                query_rows(conn, &sql)
            }
            Query::Sql {
                database,
                statement,
            } => {
                let scope = database.as_ref().or(session.default_db.as_ref());
                if let Some(db) = scope {
                    // Unqualified names must only reach the scoped database
                    detach_except(conn, &mut session.attached, db)?;
                    attach(conn, &mut session.attached, &self.data_dir, db)?;
                }
                query_rows(conn, statement)
            }
        }
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn close(&mut self, options: CloseOptions) -> Result<()> {
        {
            let mut session = self.session()?;
            let conn = session.conn.take().ok_or(HandleError::NotConnected)?;
            if options.noreply_wait {
                debug!("SQLite sessions have no pending no-reply writes");
            }
            if let Err((conn, e)) = conn.close() {
                session.conn = Some(conn);
                return Err(e.into());
            }
            session.attached.clear();
        }
        self.emit(ConnectionEvent::Close);
        Ok(())
    }

    fn use_database(&mut self, name: &str) -> Result<()> {
        validate_identifier(name)?;
        let mut session = self.session()?;
        if session.conn.is_none() {
            return Err(HandleError::NotConnected);
        }
        session.default_db = Some(name.to_string());
        Ok(())
    }

    async fn run(&self, query: &Query) -> Result<Cursor> {
        debug!("Running {}", query);
        match self.execute(query) {
            Ok(rows) => Ok(Cursor::from_rows(rows)),
            Err(e) => {
                if let Some(event) = event_for(&e) {
                    self.emit(event);
                }
                Err(e)
            }
        }
    }

    fn subscribe(&mut self, observer: Arc<dyn ConnectionObserver>) {
        if let Ok(mut observers) = self.observers.lock() {
            observers.push(observer);
        }
    }
}

/// Maps errors that say something about the session itself to an event
fn event_for(error: &HandleError) -> Option<ConnectionEvent> {
    let HandleError::Database(rusqlite::Error::SqliteFailure(failure, _)) = error else {
        return None;
    };
    match failure.code {
        ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => Some(ConnectionEvent::Timeout),
        ErrorCode::CannotOpen
        | ErrorCode::NotADatabase
        | ErrorCode::DatabaseCorrupt
        | ErrorCode::SystemIoFailure
        | ErrorCode::DiskFull => Some(ConnectionEvent::Error(error.to_string())),
        _ => None,
    }
}

fn database_path(data_dir: &Path, name: &str) -> PathBuf {
    data_dir.join(format!("{}.{}", name, DATABASE_EXTENSION))
}

/// Attaches the database file for `name` unless it already is
fn attach(
    conn: &rusqlite::Connection,
    attached: &mut HashSet<String>,
    data_dir: &Path,
    name: &str,
) -> Result<PathBuf> {
    validate_identifier(name)?;
    let path = database_path(data_dir, name);
    if attached.contains(name) {
        return Ok(path);
    }
    if !path.is_file() {
        return Err(HandleError::DatabaseNotFound(name.to_string()));
    }

    let file = path
        .to_str()
        .ok_or_else(|| HandleError::InvalidName(path.display().to_string()))?;
    conn.execute("ATTACH DATABASE ?1 AS ?2", params![file, name])?;
    attached.insert(name.to_string());
    debug!("Attached {} as {}", path.display(), name);
    Ok(path)
}

/// Detaches every attached database other than `keep`
fn detach_except(
    conn: &rusqlite::Connection,
    attached: &mut HashSet<String>,
    keep: &str,
) -> Result<()> {
    let others: Vec<String> = attached.iter().filter(|n| *n != keep).cloned().collect();
    for name in others {
        conn.execute("DETACH DATABASE ?1", params![name])?;
        attached.remove(&name);
        debug!("Detached {}", name);
    }
    Ok(())
}

/// User-defined tables of an attached database, sorted by name
fn table_names(conn: &rusqlite::Connection, database: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT name FROM {}.sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
        quote_identifier(database)
    ))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names)
}

/// Runs a statement and returns each row as an object keyed by column name
fn query_rows(conn: &rusqlite::Connection, sql: &str) -> Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let rows = stmt
        .query_map([], |row| {
            let mut object = Map::with_capacity(columns.len());
            for (i, column) in columns.iter().enumerate() {
                object.insert(column.clone(), to_json(row.get_ref(i)?));
            }
            Ok(Value::Object(object))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Converts a SQLite value to JSON. Non-finite reals become null.
fn to_json(value: ValueRef) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Array(b.iter().map(|byte| Value::from(*byte)).collect()),
    }
}

/// Accepts `[A-Za-z_][A-Za-z0-9_]*`
fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(HandleError::InvalidName(name.to_string()))
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
