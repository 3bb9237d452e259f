//! `store`: persistent identity, category, complaint and knowledge records.
//!
//! One SQLite database under the work dir. Each submodule adds an `impl
//! Database` block for its own table; all of them share the connection and
//! the helpers below.

mod categories;
mod complaints;
mod knowledge;
mod types;
mod users;

pub use complaints::{ComplaintFilter, ComplaintStats};
pub use users::UserUpdate;
pub use types::*;

use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, ErrorCode};

use crate::error::AppError;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS categories (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL DEFAULT '',
        staff_user_id TEXT REFERENCES users(id) ON DELETE SET NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT,
        role TEXT NOT NULL,
        assigned_category_id TEXT REFERENCES categories(id) ON DELETE SET NULL,
        google_id TEXT UNIQUE,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS complaints (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        category_id TEXT NOT NULL REFERENCES categories(id),
        status TEXT NOT NULL,
        student_id TEXT NOT NULL REFERENCES users(id),
        file_url TEXT,
        remarks TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS complaints_student ON complaints(student_id, created_at);
    CREATE INDEX IF NOT EXISTS complaints_category ON complaints(category_id, created_at);

    CREATE TABLE IF NOT EXISTS knowledge_docs (
        id TEXT PRIMARY KEY,
        original_name TEXT NOT NULL,
        stored_path TEXT NOT NULL,
        uploaded_by TEXT NOT NULL REFERENCES users(id),
        chunk_count INTEGER NOT NULL,
        vector_ids TEXT NOT NULL,
        file_size INTEGER NOT NULL,
        created_at TEXT NOT NULL
    );

    PRAGMA user_version = 1;
";

/// Handle to the campus-desk database. Share it behind an `Arc`.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (creating if needed) the database file and apply the schema.
    pub fn open(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::Store(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| AppError::Store(format!("open {}: {e}", path.display())))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| AppError::Store(format!("set journal_mode WAL: {e}")))?;
        Self::init(conn)
    }

    /// Fresh in-memory database, for tests and the seed dry-run.
    pub fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Store(format!("open in-memory db: {e}")))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, AppError> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| AppError::Store(format!("set foreign_keys ON: {e}")))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|e| AppError::Store(format!("set busy_timeout: {e}")))?;

        let version: i64 = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .map_err(|e| AppError::Store(format!("read schema version: {e}")))?;

        if version == 0 {
            conn.execute_batch(SCHEMA)
                .map_err(|e| AppError::Store(format!("initialize schema: {e}")))?;
        } else if version != SCHEMA_VERSION {
            return Err(AppError::Store(format!(
                "unsupported schema version {version}, expected {SCHEMA_VERSION}"
            )));
        }

        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.conn
            .lock()
            .map_err(|_| AppError::Store("database mutex poisoned".into()))
    }
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

pub(crate) fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Read a text column and parse it into one of the wire enums.
fn parse_column<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = AppError>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: AppError| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Map a UNIQUE violation to the user-facing duplicate message; pass anything
/// else through as a store error.
fn unique_violation(e: rusqlite::Error, field: &str) -> AppError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            AppError::Conflict(format!(
                "Duplicate value for {field}. This {field} already exists."
            ))
        }
        _ => AppError::from(e),
    }
}
