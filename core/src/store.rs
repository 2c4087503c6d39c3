use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};
use tracing::warn;

use crate::error::{Result, SyncError};
use crate::models::ApiState;
use crate::pending::PendingOperation;

const KEY_STATE: &str = "state";
const KEY_PENDING: &str = "pending";

/// Durable home of the last good snapshot and the pending queue.
///
/// Reads never fail: anything missing or unreadable comes back as "nothing stored".
pub trait LocalStore: Send + Sync {
    fn read(&self) -> Option<ApiState>;

    fn write(&self, state: &ApiState) -> Result<()>;

    fn read_pending(&self) -> Vec<PendingOperation>;

    /// Overwrite the queue. An empty queue removes the stored key.
    fn write_pending(&self, operations: &[PendingOperation]) -> Result<()>;

    /// Persist snapshot and queue together.
    fn commit(&self, state: &ApiState, operations: &[PendingOperation]) -> Result<()> {
        self.write_pending(operations)?;
        self.write(state)
    }
}

/// `LocalStore` over a one-table SQLite key/value database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| {
            SyncError::Storage(format!("failed to open cache {}: {e}", path.display()))
        })?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn migrate(conn: &Connection) -> Result<()> {
        let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS kv (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );
                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SyncError::Storage("cache connection poisoned".to_string()))
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn put(conn: &Connection, key: &str, value: &str) -> Result<()> {
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn put_pending(conn: &Connection, operations: &[PendingOperation]) -> Result<()> {
        if operations.is_empty() {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![KEY_PENDING])?;
            return Ok(());
        }
        Self::put(conn, KEY_PENDING, &encode(operations)?)
    }

    #[cfg(test)]
    fn raw(&self, key: &str) -> Result<Option<String>> {
        self.get(key)
    }

    #[cfg(test)]
    fn put_raw(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn()?;
        Self::put(&conn, key, value)
    }
}

impl LocalStore for SqliteStore {
    fn read(&self) -> Option<ApiState> {
        let raw = match self.get(KEY_STATE) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "could not read cached state");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(error = %e, "cached state is corrupted, ignoring it");
                None
            }
        }
    }

    fn write(&self, state: &ApiState) -> Result<()> {
        let json = encode(state)?;
        let conn = self.conn()?;
        Self::put(&conn, KEY_STATE, &json)
    }

    fn read_pending(&self) -> Vec<PendingOperation> {
        let raw = match self.get(KEY_PENDING) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "could not read pending queue");
                return Vec::new();
            }
        };
        decode_pending(&raw)
    }

    fn write_pending(&self, operations: &[PendingOperation]) -> Result<()> {
        let conn = self.conn()?;
        Self::put_pending(&conn, operations)
    }

    fn commit(&self, state: &ApiState, operations: &[PendingOperation]) -> Result<()> {
        let json = encode(state)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        Self::put_pending(&tx, operations)?;
        Self::put(&tx, KEY_STATE, &json)?;
        tx.commit()?;
        Ok(())
    }
}

fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| SyncError::Storage(format!("encode failed: {e}")))
}

/// Decode the stored queue one record at a time, dropping records that no longer
/// parse (unknown `type`, missing payload) instead of losing the whole queue.
fn decode_pending(raw: &str) -> Vec<PendingOperation> {
    let records: Vec<serde_json::Value> = match serde_json::from_str(raw) {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "pending queue is corrupted, starting empty");
            return Vec::new();
        }
    };
    records
        .into_iter()
        .filter_map(|record| match serde_json::from_value(record) {
            Ok(op) => Some(op),
            Err(e) => {
                warn!(error = %e, "dropping unreadable pending operation");
                None
            }
        })
        .collect()
}
