//! SQLite storage backend

use crate::{now_millis, PersistedRecord, Store, StoreError};
use async_trait::async_trait;
use padsync_core::DocumentName;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// SQLite storage backend
///
/// Embedded persistence suitable for single-node deployments.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at the given path
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;

        let store = Self {
            conn: Mutex::new(conn),
        };

        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory SQLite database (for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Database(e.to_string()))?;

        let store = Self {
            conn: Mutex::new(conn),
        };

        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();

        // WAL for concurrent readers; the pragma reports the resulting mode.
        let _mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| StoreError::Database(e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                name TEXT PRIMARY KEY,
                state BLOB NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_updated_at ON documents(updated_at);
            "#,
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn load(&self, name: &DocumentName) -> Result<Option<PersistedRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let row: Option<(Vec<u8>, i64)> = conn
            .query_row(
                "SELECT state, updated_at FROM documents WHERE name = ?1",
                params![name.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(row.map(|(state, updated_at)| PersistedRecord {
            name: name.clone(),
            state,
            updated_at: updated_at as u64,
        }))
    }

    async fn save(&self, name: &DocumentName, state: &[u8]) -> Result<(), StoreError> {
        let now = now_millis() as i64;
        let conn = self.conn.lock().unwrap();

        conn.execute(
            r#"
            INSERT INTO documents (name, state, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(name) DO UPDATE SET
                state = excluded.state,
                updated_at = excluded.updated_at
            "#,
            params![name.as_str(), state, now],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<(DocumentName, u64)>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare("SELECT name, updated_at FROM documents ORDER BY updated_at DESC LIMIT ?1")
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let rows: Vec<(DocumentName, u64)> = stmt
            .query_map(params![limit as i64], |row| {
                let name: String = row.get(0)?;
                let updated_at: i64 = row.get(1)?;
                Ok((name, updated_at))
            })
            .map_err(|e| StoreError::Database(e.to_string()))?
            .filter_map(|r| r.ok())
            .filter_map(|(name, updated_at)| {
                DocumentName::new(name).ok().map(|n| (n, updated_at as u64))
            })
            .collect();

        Ok(rows)
    }

    async fn delete(&self, name: &DocumentName) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();

        let affected = conn
            .execute(
                "DELETE FROM documents WHERE name = ?1",
                params![name.as_str()],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(affected > 0)
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sqlite_crud() {
        let store = SqliteStore::in_memory().unwrap();
        let name = DocumentName::new("notes").unwrap();

        store.save(&name, b"hello sqlite").await.unwrap();

        let record = store.load(&name).await.unwrap().unwrap();
        assert_eq!(record.state, b"hello sqlite");
        assert!(record.updated_at > 0);

        assert!(store.delete(&name).await.unwrap());
        assert!(store.load(&name).await.unwrap().is_none());
        assert!(!store.delete(&name).await.unwrap());
    }

    #[tokio::test]
    async fn test_sqlite_upsert() {
        let store = SqliteStore::in_memory().unwrap();
        let name = DocumentName::new("notes").unwrap();

        store.save(&name, b"version1").await.unwrap();
        store.save(&name, b"version2").await.unwrap();

        let record = store.load(&name).await.unwrap().unwrap();
        assert_eq!(record.state, b"version2");
        assert_eq!(store.list(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_list_order_and_limit() {
        let store = SqliteStore::in_memory().unwrap();
        for i in 0..3 {
            let name = DocumentName::new(format!("doc-{}", i)).unwrap();
            store.save(&name, b"data").await.unwrap();
            tokio::time::sleep(Duration::from_millis(3)).await;
        }

        let rows = store.list(2).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0.as_str(), "doc-2");
        assert_eq!(rows[1].0.as_str(), "doc-1");
    }

    #[tokio::test]
    async fn test_sqlite_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("padsync.db");
        let name = DocumentName::new("durable").unwrap();

        {
            let store = SqliteStore::new(&path).unwrap();
            store.save(&name, b"persisted").await.unwrap();
        }

        let store = SqliteStore::new(&path).unwrap();
        let record = store.load(&name).await.unwrap().unwrap();
        assert_eq!(record.state, b"persisted");
    }
}
