//! Connection pool construction.
//!
//! Every pooled connection runs the same init pragmas (WAL, foreign keys,
//! busy timeout). In-memory pools are capped at one connection because each
//! `SQLite` in-memory connection is its own database.

use std::path::Path;
use std::time::Duration;

use r2d2_sqlite::SqliteConnectionManager;

use crate::errors::{Result, StoreError};
use crate::sqlite::migrations::run_migrations;

/// Pool of `SQLite` connections.
pub type ConnectionPool = r2d2::Pool<SqliteConnectionManager>;
/// A connection checked out of [`ConnectionPool`].
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Pool and pragma configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Maximum pooled connections (file databases only).
    pub pool_size: u32,
    /// `PRAGMA busy_timeout` in milliseconds.
    pub busy_timeout_ms: u64,
    /// How long `pool.get()` waits before failing.
    pub connection_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            busy_timeout_ms: 5_000,
            connection_timeout: Duration::from_secs(5),
        }
    }
}

fn with_pragmas(manager: SqliteConnectionManager, config: &ConnectionConfig) -> SqliteConnectionManager {
    let busy = config.busy_timeout_ms;
    manager.with_init(move |conn| {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {busy};"
        ))
    })
}

/// Open a pool over a database file. The file is created if missing; its
/// parent directory must exist.
pub fn new_file(path: &str, config: &ConnectionConfig) -> Result<ConnectionPool> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            return Err(StoreError::Unavailable(format!(
                "database directory does not exist: {}",
                parent.display()
            )));
        }
    }
    let manager = with_pragmas(SqliteConnectionManager::file(path), config);
    r2d2::Pool::builder()
        .max_size(config.pool_size.max(1))
        .connection_timeout(config.connection_timeout)
        .build(manager)
        .map_err(|e| StoreError::Unavailable(format!("{path}: {e}")))
}

/// Open a single-connection in-memory pool.
///
/// The connection is never recycled: closing it would drop the database.
pub fn new_in_memory(config: &ConnectionConfig) -> Result<ConnectionPool> {
    let manager = with_pragmas(SqliteConnectionManager::memory(), config);
    r2d2::Pool::builder()
        .max_size(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connection_timeout(config.connection_timeout)
        .build(manager)
        .map_err(|e| StoreError::Unavailable(format!("in-memory database: {e}")))
}

/// Where a connection string points.
#[derive(Debug, PartialEq, Eq)]
enum DatabaseLocation<'a> {
    Memory,
    File(&'a str),
}

fn parse_url(url: &str) -> Result<DatabaseLocation<'_>> {
    let url = url.trim();
    if url.is_empty() {
        return Err(StoreError::Unavailable("database url is empty".into()));
    }
    if matches!(url, ":memory:" | "sqlite::memory:" | "sqlite://:memory:") {
        return Ok(DatabaseLocation::Memory);
    }
    if let Some(rest) = url.strip_prefix("sqlite://") {
        return non_empty_path(url, rest);
    }
    if let Some(rest) = url.strip_prefix("sqlite:") {
        return non_empty_path(url, rest);
    }
    if let Some((scheme, _)) = url.split_once("://") {
        return Err(StoreError::Unavailable(format!(
            "unsupported database url scheme '{scheme}'"
        )));
    }
    Ok(DatabaseLocation::File(url))
}

fn non_empty_path<'a>(url: &str, path: &'a str) -> Result<DatabaseLocation<'a>> {
    if path.is_empty() {
        Err(StoreError::Unavailable(format!("database url has no path: {url}")))
    } else {
        Ok(DatabaseLocation::File(path))
    }
}

/// Open a pool from a connection string and bring the schema up to date.
///
/// Accepted forms: `sqlite://<path>`, `sqlite:<path>`, `sqlite::memory:`,
/// `:memory:`, or a bare path. Every failure is [`StoreError::Unavailable`].
pub fn open_url(url: &str, config: &ConnectionConfig) -> Result<ConnectionPool> {
    let pool = match parse_url(url)? {
        DatabaseLocation::Memory => new_in_memory(config)?,
        DatabaseLocation::File(path) => new_file(path, config)?,
    };
    {
        let conn = pool
            .get()
            .map_err(|e| StoreError::Unavailable(format!("{url}: {e}")))?;
        let applied = run_migrations(&conn)
            .map_err(|e| StoreError::Unavailable(format!("migration failed: {e}")))?;
        tracing::debug!(url, applied, "identity store ready");
    }
    Ok(pool)
}
