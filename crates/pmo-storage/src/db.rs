//! Database connection management.
//!
//! Wraps a single rusqlite Connection in a Mutex for thread-safe access.
//! Configures WAL mode and recommended PRAGMAs on initialization.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use tracing::info;

use pmo_core::error::PmoError;

use crate::migrations;

/// Thread-safe SQLite database wrapper.
///
/// Several `Database` handles (or processes) may point at the same file;
/// cross-handle coordination relies on SQLite locking plus the unique
/// constraints declared in the schema, never on this mutex.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database at the given path.
    ///
    /// Configures WAL mode, synchronous=NORMAL, foreign keys, the busy
    /// timeout, and runs all pending migrations.
    pub fn new(path: &Path, busy_timeout_ms: u64) -> Result<Self, PmoError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| PmoError::Storage(format!("Failed to open database: {}", e)))?;

        // Busy timeout first: switching to WAL takes a lock other openers may hold.
        conn.busy_timeout(Duration::from_millis(busy_timeout_ms))
            .map_err(|e| PmoError::Storage(format!("Failed to set busy timeout: {}", e)))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(|e| PmoError::Storage(format!("Failed to set pragmas: {}", e)))?;

        info!("Database opened at {}", path.display());

        Self::with_migrations(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, PmoError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| PmoError::Storage(format!("Failed to open in-memory db: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| PmoError::Storage(format!("Failed to set pragmas: {}", e)))?;

        Self::with_migrations(conn)
    }

    fn with_migrations(conn: Connection) -> Result<Self, PmoError> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Execute a closure with a reference to the underlying connection.
    ///
    /// The mutex is held for the duration of the closure, so the closure
    /// must not block on anything but SQLite.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, PmoError>
    where
        F: FnOnce(&Connection) -> Result<T, PmoError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| PmoError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

/// True when a statement failed on a UNIQUE or PRIMARY KEY constraint.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        }
        _ => false,
    }
}

/// Map a rusqlite error into a storage error with context.
pub(crate) fn sql_err(context: &'static str) -> impl Fn(rusqlite::Error) -> PmoError {
    move |e| PmoError::Storage(format!("{}: {}", context, e))
}
