pub mod migrations;
pub mod queries;

use std::path::Path;
use std::sync::Mutex;

use eddy_types::{Result, SyncError};
use rusqlite::Connection;
use tracing::info;

/// Durable on-device mirror of synced messages.
///
/// Single writer: the `Mutex` serializes every transaction on this handle,
/// so overlapping upserts from concurrent merge cycles never interleave at
/// the statement level.
pub struct LocalStore {
    conn: Mutex<Connection>,
}

impl LocalStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(open_err)?;
        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL").map_err(open_err)?;
        Self::init(conn, &path.display().to_string())
    }

    /// In-memory store, used by tests and throwaway sessions.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(open_err)?;
        Self::init(conn, ":memory:")
    }

    fn init(conn: Connection, label: &str) -> Result<Self> {
        let mut conn = conn;
        if !queries::table_exists(&conn).map_err(open_err)? {
            migrations::create_base_schema(&conn)?;
        }
        migrations::migrate(&mut conn)?;

        info!("local store opened at {}", label);
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub(crate) fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| SyncError::LocalWrite(format!("store lock poisoned: {e}")))?;
        f(&conn)
    }

    pub(crate) fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| SyncError::LocalWrite(format!("store lock poisoned: {e}")))?;
        f(&mut conn)
    }
}

fn open_err(e: rusqlite::Error) -> SyncError {
    SyncError::LocalWrite(format!("open: {e}"))
}
