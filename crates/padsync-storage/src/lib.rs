//! padsync storage backends
//!
//! Durable persistence for replica state, keyed by document name:
//! - Memory (default): fast, volatile storage
//! - SQLite: embedded persistence
//! - PostgreSQL: scalable persistence

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use async_trait::async_trait;
use padsync_core::DocumentName;
use std::time::{SystemTime, UNIX_EPOCH};

/// A persisted document: at most one live record per name (upsert).
#[derive(Debug, Clone)]
pub struct PersistedRecord {
    pub name: DocumentName,
    /// Serialized replica state (a full-state update).
    pub state: Vec<u8>,
    /// Unix milliseconds of the last save.
    pub updated_at: u64,
}

/// Durable store for replica state.
///
/// The engine never assumes a storage technology; a backend may be an
/// embedded database or a remote call.
#[async_trait]
pub trait Store: Send + Sync {
    /// Load the record for a document, if one exists.
    async fn load(&self, name: &DocumentName) -> Result<Option<PersistedRecord>, StoreError>;

    /// Upsert the record for a document.
    async fn save(&self, name: &DocumentName, state: &[u8]) -> Result<(), StoreError>;

    /// Most recently updated documents, newest first.
    async fn list(&self, limit: usize) -> Result<Vec<(DocumentName, u64)>, StoreError>;

    /// Remove a document's record. Returns whether one existed.
    async fn delete(&self, name: &DocumentName) -> Result<bool, StoreError>;

    /// Identifier of the backing technology, for introspection.
    fn backend(&self) -> &'static str;
}

/// Storage error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
