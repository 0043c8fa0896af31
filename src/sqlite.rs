//! SQLite-backed key-value store.
//!
//! One `kv` table; every `put` is a single upsert statement, so a record is
//! replaced atomically.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use log::info;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::{DeltaError, Result};
use crate::storage::KeyValueStore;

impl From<rusqlite::Error> for DeltaError {
    fn from(e: rusqlite::Error) -> Self {
        DeltaError::Storage {
            message: e.to_string(),
        }
    }
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::init_schema(&conn)?;
        info!("[SqliteStore] Opened {}", path.as_ref().display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DeltaError::storage("sqlite connection lock poisoned"))
    }
}

impl KeyValueStore for SqliteStore {
    fn put(&self, key: &str, value: &Value) -> Result<()> {
        let text = serde_json::to_string(value)?;
        self.conn()?.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, text, Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Value>> {
        let text: Option<String> = self
            .conn()?
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;

        match text {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}
