//! SQLite database wrapper
//!
//! Every connection gets the same pragmas: foreign keys on (group deletes
//! cascade to declarations) and a busy timeout so a reader opening while a
//! writer commits waits instead of failing. File databases run in WAL mode
//! so readers see the last committed snapshot while a write is in flight.

use rusqlite::{Connection, OpenFlags, Result};
use std::path::Path;
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite connection with the index's pragmas applied
pub struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    /// Open or create a SQLite database file (read-write)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::configure(conn)
    }

    /// Open an existing database file for queries only
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::configure(conn)
    }

    /// Create an in-memory database for testing
    pub fn open_in_memory() -> Result<Self> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn })
    }

    /// Get reference to underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_in_memory_enables_foreign_keys() -> anyhow::Result<()> {
        let db = SqliteDatabase::open_in_memory()?;
        let on: i64 = db
            .connection()
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        assert_eq!(on, 1);
        Ok(())
    }

    #[test]
    fn test_file_database_uses_wal() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("index.db");
        let db = SqliteDatabase::open(&path)?;
        let mode: String = db
            .connection()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        assert_eq!(mode.to_lowercase(), "wal");

        db.connection()
            .execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1);")?;
        let reader = SqliteDatabase::open_read_only(&path)?;
        let x: i64 = reader
            .connection()
            .query_row("SELECT x FROM t", [], |row| row.get(0))?;
        assert_eq!(x, 1);
        Ok(())
    }
}
