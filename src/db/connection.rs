use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::errors::{ContactGraphError, Result};

/// The embedded SQL schema applied when initializing a new database.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Default time a writer waits for the database lock before failing.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// SQLite database holding the contact graph.
///
/// One `Database` owns one connection. Callers that need concurrent access
/// open one handle per thread; writers are serialized by SQLite's lock.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Creates a new database at `db_path`, creating parent directories if needed.
    ///
    /// Opens a SQLite connection, applies pragmas, and executes the schema.
    /// Safe to call on an existing database: the schema is idempotent.
    pub fn initialize(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ContactGraphError::Database {
                message: format!("failed to create database directory: {e}"),
                operation: "initialize".to_string(),
            })?;
        }

        let conn = Connection::open(db_path).map_err(|e| ContactGraphError::Database {
            message: format!("failed to open database: {e}"),
            operation: "initialize".to_string(),
        })?;

        Self::from_connection(conn, "initialize")
    }

    /// Opens an existing database at `db_path` and applies pragmas.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path).map_err(|e| ContactGraphError::Database {
            message: format!("failed to open database: {e}"),
            operation: "open".to_string(),
        })?;

        Self::apply_pragmas(&conn)?;

        Ok(Self { conn })
    }

    /// Opens a private in-memory database with the schema applied.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| ContactGraphError::Database {
            message: format!("failed to open in-memory database: {e}"),
            operation: "open_in_memory".to_string(),
        })?;

        Self::from_connection(conn, "open_in_memory")
    }

    fn from_connection(conn: Connection, operation: &str) -> Result<Self> {
        Self::apply_pragmas(&conn)?;

        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| ContactGraphError::Database {
                message: format!("failed to apply schema: {e}"),
                operation: operation.to_string(),
            })?;

        Ok(Self { conn })
    }

    /// Overrides how long a blocked writer waits for the lock.
    pub fn set_busy_timeout(&self, timeout_ms: u64) -> Result<()> {
        self.conn
            .busy_timeout(Duration::from_millis(timeout_ms))
            .map_err(|e| ContactGraphError::Database {
                message: format!("failed to set busy timeout: {e}"),
                operation: "set_busy_timeout".to_string(),
            })
    }

    /// Returns a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Starts a `BEGIN IMMEDIATE` transaction on this connection.
    ///
    /// The write lock is taken up front, so two handles running the
    /// read-decide-write sequence of an identify call cannot interleave.
    /// Every query issued through `self` while the returned guard is alive
    /// belongs to the transaction; dropping the guard without committing
    /// rolls it back.
    pub fn begin_immediate(&self) -> Result<Transaction<'_>> {
        Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate).map_err(|e| {
            ContactGraphError::Database {
                message: format!("failed to begin transaction: {e}"),
                operation: "begin_immediate".to_string(),
            }
        })
    }

    /// Consumes the `Database`, closing the underlying connection.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| ContactGraphError::Database {
                message: format!("failed to close database: {e}"),
                operation: "close".to_string(),
            })
    }

    /// Returns the on-disk size of the database file in bytes.
    pub fn size(&self) -> Result<u64> {
        let size: i64 = self
            .conn
            .query_row(
                "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
                [],
                |row| row.get(0),
            )
            .map_err(|e| ContactGraphError::Database {
                message: format!("failed to get database size: {e}"),
                operation: "size".to_string(),
            })?;
        Ok(size as u64)
    }

    fn apply_pragmas(conn: &Connection) -> Result<()> {
        // Set before the journal-mode switch, which itself needs the lock.
        conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
            .map_err(|e| ContactGraphError::Database {
                message: format!("failed to set busy timeout: {e}"),
                operation: "apply_pragmas".to_string(),
            })?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;",
        )
        .map_err(|e| ContactGraphError::Database {
            message: format!("failed to apply pragmas: {e}"),
            operation: "apply_pragmas".to_string(),
        })
    }
}
