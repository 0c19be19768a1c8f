use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use log::info;
use rusqlite::{Connection, OpenFlags};
use serde::Deserialize;

use crate::StoreError;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// SQLite journal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    #[default]
    Wal,
    Delete,
}

impl JournalMode {
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// SQLite synchronous mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Full,
    #[default]
    Normal,
}

impl SyncMode {
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Connection settings shared by every store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteOptions {
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default)]
    pub journal_mode: JournalMode,
    #[serde(default)]
    pub sync_mode: SyncMode,
}

const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: JournalMode::default(),
            sync_mode: SyncMode::default(),
        }
    }
}

/// Opens the database file at `path`, creating it and its parent directory when missing.
pub(crate) fn open_connection(path: &Path, options: &SqliteOptions) -> Result<Connection, StoreError> {
    if path.is_dir() {
        return Err(StoreError::Invalid(format!(
            "store path {} is a directory",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(path, flags)?;
    connection.execute_batch(&format!(
        "PRAGMA journal_mode = {}; PRAGMA synchronous = {};",
        options.journal_mode.pragma_value(),
        options.sync_mode.pragma_value()
    ))?;
    connection.busy_timeout(Duration::from_millis(options.busy_timeout_ms))?;
    Ok(connection)
}

/// Adds `column` to `table` when an older layout lacks it.
///
/// Returns true when the column was added, so the caller can backfill it.
pub(crate) fn ensure_column(
    connection: &Connection,
    table: &str,
    column: &str,
    definition: &str,
) -> Result<bool, StoreError> {
    let mut stmt = connection.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    if columns.iter().any(|c| c == column) {
        return Ok(false);
    }
    connection.execute_batch(&format!(
        "ALTER TABLE {table} ADD COLUMN {column} {definition};"
    ))?;
    info!("Migrated table {table}: added column {column}");
    Ok(true)
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Db("store mutex poisoned".to_string()))
}

pub(crate) fn unix_millis() -> i64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_column_adds_once() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_connection(&dir.path().join("t.db"), &SqliteOptions::default()).unwrap();
        conn.execute_batch("CREATE TABLE t (a TEXT);").unwrap();
        assert!(ensure_column(&conn, "t", "b", "INTEGER NOT NULL DEFAULT 0").unwrap());
        assert!(!ensure_column(&conn, "t", "b", "INTEGER NOT NULL DEFAULT 0").unwrap());
    }

    #[test]
    fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("t.db");
        open_connection(&path, &SqliteOptions::default()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn rejects_directory_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            open_connection(dir.path(), &SqliteOptions::default()),
            Err(StoreError::Invalid(_))
        ));
    }
}
