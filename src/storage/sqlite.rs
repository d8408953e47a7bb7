//! SQLite-backed data store.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};

use crate::error::StorageError;

/// Handle to a SQLite database file.
///
/// Holds only the path; connections are opened per call by
/// [`SqliteStore::open`] and dropped when the caller is done with them.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Creates a store for an existing database file.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the file does not exist.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if !path.exists() {
            return Err(StorageError::NotFound {
                path: path.display().to_string(),
            });
        }
        Ok(Self { path })
    }

    /// Path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens a fresh read-only connection.
    ///
    /// Writes through this connection fail with `SQLITE_READONLY`
    /// regardless of what statement the model sends.
    pub fn open(&self) -> Result<Connection, StorageError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI;
        Ok(Connection::open_with_flags(&self.path, flags)?)
    }

    /// Lists user tables, sorted by name.
    pub fn table_names(&self) -> Result<Vec<String>, StorageError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}

/// Runs `sql` and flattens the result set into one space-joined string.
///
/// Values are emitted in row-major order: every column of the first row,
/// then every column of the next. Row and column boundaries are not
/// preserved. `NULL` renders as `NULL`, blobs as `<blob N bytes>`.
pub fn flatten_query(conn: &Connection, sql: &str) -> rusqlite::Result<String> {
    let mut stmt = conn.prepare(sql)?;
    let columns = stmt.column_count();
    let mut rows = stmt.query([])?;

    let mut out = String::new();
    while let Some(row) = rows.next()? {
        for idx in 0..columns {
            if !out.is_empty() {
                out.push(' ');
            }
            push_value(&mut out, row.get_ref(idx)?);
        }
    }
    Ok(out)
}

fn push_value(out: &mut String, value: ValueRef<'_>) {
    match value {
        ValueRef::Null => out.push_str("NULL"),
        ValueRef::Integer(i) => {
            let _ = write!(out, "{i}");
        }
        ValueRef::Real(f) => {
            let _ = write!(out, "{f}");
        }
        ValueRef::Text(t) => out.push_str(&String::from_utf8_lossy(t)),
        ValueRef::Blob(b) => {
            let _ = write!(out, "<blob {} bytes>", b.len());
        }
    }
}
