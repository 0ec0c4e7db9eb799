use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use crate::error::StoreError;
use crate::session::{SessionKey, StoredSession};

/// Durable key-value port for session snapshots.
pub trait SessionStore {
    fn get(&self, key: &SessionKey) -> Result<Option<StoredSession>, StoreError>;
    fn put(&self, key: &SessionKey, session: &StoredSession) -> Result<(), StoreError>;
    fn delete(&self, key: &SessionKey) -> Result<(), StoreError>;
}

/// SQLite-backed store; one JSON payload per `(quiz_id, candidate_id)`.
#[derive(Debug)]
pub struct SqliteSessionStore {
    conn: Connection,
}

impl SqliteSessionStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                quiz_id TEXT NOT NULL,
                candidate_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (quiz_id, candidate_id)
            )
            "#,
            [],
        )?;
        Ok(Self { conn })
    }
}

impl SessionStore for SqliteSessionStore {
    fn get(&self, key: &SessionKey) -> Result<Option<StoredSession>, StoreError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM sessions WHERE quiz_id = ?1 AND candidate_id = ?2",
                params![key.quiz_id, key.candidate_id],
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn put(&self, key: &SessionKey, session: &StoredSession) -> Result<(), StoreError> {
        let payload = serde_json::to_string(session)?;
        self.conn.execute(
            r#"
            INSERT INTO sessions (quiz_id, candidate_id, payload, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(quiz_id, candidate_id) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
            params![
                key.quiz_id,
                key.candidate_id,
                payload,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn delete(&self, key: &SessionKey) -> Result<(), StoreError> {
        self.conn.execute(
            "DELETE FROM sessions WHERE quiz_id = ?1 AND candidate_id = ?2",
            params![key.quiz_id, key.candidate_id],
        )?;
        Ok(())
    }
}

/// In-process store. Clones share the same map, so a test can hand one clone
/// to a controller and inspect or reuse the other.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    entries: Rc<RefCell<HashMap<SessionKey, String>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &SessionKey) -> Result<Option<StoredSession>, StoreError> {
        match self.entries.borrow().get(key) {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    fn put(&self, key: &SessionKey, session: &StoredSession) -> Result<(), StoreError> {
        let json = serde_json::to_string(session)?;
        self.entries.borrow_mut().insert(key.clone(), json);
        Ok(())
    }

    fn delete(&self, key: &SessionKey) -> Result<(), StoreError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}
