//! Versioned schema evolution for the local store.
//!
//! The version counter lives inside the store file itself
//! (`PRAGMA user_version`), never in process memory, so a crashed or
//! downgraded process always sees the truth at next open. All pending steps
//! of one `migrate()` call run inside a single transaction: either every
//! step applies and the version reaches [`LATEST`], or none do and the
//! stored version is untouched for a retry at next startup.

use eddy_types::{Result, SyncError};
use rusqlite::Connection;
use tracing::{info, warn};

pub type MigrationFn = fn(&Connection) -> rusqlite::Result<()>;

/// One entry per version step, indexed by the version it migrates *from*.
/// A `None` entry is a gap: skipped with a warning, but the counter still
/// advances past it. Deliberate forward-compatibility policy — an old
/// binary opening a store partially migrated by a newer one must not wedge.
pub const MIGRATIONS: &[Option<MigrationFn>] = &[Some(add_seq_column)];

pub const LATEST: i64 = MIGRATIONS.len() as i64;

/// Version-0 schema. Fresh stores are created here and then immediately
/// migrated, so the fresh path and the upgrade path exercise the same steps.
pub fn create_base_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            room_id     TEXT NOT NULL,
            sender_id   TEXT NOT NULL,
            body        TEXT NOT NULL,
            kind        TEXT NOT NULL DEFAULT 'text',
            image_url   TEXT,
            status      TEXT NOT NULL DEFAULT 'sent',
            created_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_room
            ON messages(room_id, created_at);
        ",
    )
    .map_err(|e| SyncError::Migration(format!("create base schema: {e}")))?;
    Ok(())
}

/// Bring the store up to [`LATEST`].
pub fn migrate(conn: &mut Connection) -> Result<()> {
    migrate_with(conn, MIGRATIONS)
}

fn migrate_with(conn: &mut Connection, steps: &[Option<MigrationFn>]) -> Result<()> {
    let latest = steps.len() as i64;
    let tx = conn
        .transaction()
        .map_err(|e| SyncError::Migration(format!("begin: {e}")))?;

    let mut current = read_version(&tx)?;
    if current >= latest {
        return Ok(());
    }
    let from = current;

    while current < latest {
        match steps[current as usize] {
            Some(step) => {
                step(&tx).map_err(|e| {
                    SyncError::Migration(format!("step {} -> {}: {e}", current, current + 1))
                })?;
            }
            None => {
                warn!("no migration registered for version {current}, skipping");
            }
        }
        current += 1;
    }

    write_version(&tx, latest)?;
    tx.commit().map_err(|e| SyncError::Migration(format!("commit: {e}")))?;

    info!("store schema migrated {} -> {}", from, latest);
    Ok(())
}

fn read_version(conn: &Connection) -> Result<i64> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| SyncError::Migration(format!("read version: {e}")))
}

fn write_version(conn: &Connection, version: i64) -> Result<()> {
    conn.pragma_update(None, "user_version", version)
        .map_err(|e| SyncError::Migration(format!("write version: {e}")))
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// v0 -> v1: server-assigned ordering column. Probes first so re-running an
/// already-applied step is a no-op, not a duplicate-column error.
fn add_seq_column(conn: &Connection) -> rusqlite::Result<()> {
    if !column_exists(conn, "messages", "seq")? {
        conn.execute_batch(
            "ALTER TABLE messages ADD COLUMN seq INTEGER NOT NULL DEFAULT 0;
             CREATE INDEX IF NOT EXISTS idx_messages_room_seq ON messages(room_id, seq);",
        )?;
    }
    Ok(())
}
