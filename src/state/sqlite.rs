//! SQLite-backed per-user conversation state.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::core::UserId;
use crate::error::Error;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS conversation_state (
    user_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, key)
);
"#;

/// Key/value store scoped by user.
pub struct StateStore {
    conn: Mutex<Connection>,
}

impl StateStore {
    /// Open (and create if needed) a store at `path`.
    pub fn open(path: &Path) -> Result<Self, Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::debug!("Opened state store at {}", path.display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, Error> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        self.conn
            .lock()
            .map_err(|_| Error::State("state store lock poisoned".to_string()))
    }

    pub fn get(&self, user: &UserId, key: &str) -> Result<Option<String>, Error> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM conversation_state WHERE user_id = ?1 AND key = ?2",
                params![user.as_str(), key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, user: &UserId, key: &str, value: &str) -> Result<(), Error> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO conversation_state (user_id, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![user.as_str(), key, value, chrono::Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    pub fn remove(&self, user: &UserId, key: &str) -> Result<bool, Error> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM conversation_state WHERE user_id = ?1 AND key = ?2",
            params![user.as_str(), key],
        )?;
        Ok(removed > 0)
    }

    /// Drop everything stored for `user`.
    pub fn clear(&self, user: &UserId) -> Result<usize, Error> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM conversation_state WHERE user_id = ?1",
            params![user.as_str()],
        )?;
        Ok(removed)
    }
}
