//! In-memory storage backend

use crate::{now_millis, PersistedRecord, Store, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use padsync_core::DocumentName;

/// In-memory storage backend
///
/// Fast, volatile storage suitable for development and tests.
/// Documents are lost when the process exits.
pub struct MemoryStore {
    /// Document records: name -> (state, updated_at)
    records: DashMap<String, (Vec<u8>, u64)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load(&self, name: &DocumentName) -> Result<Option<PersistedRecord>, StoreError> {
        Ok(self.records.get(name.as_str()).map(|entry| {
            let (state, updated_at) = entry.value();
            PersistedRecord {
                name: name.clone(),
                state: state.clone(),
                updated_at: *updated_at,
            }
        }))
    }

    async fn save(&self, name: &DocumentName, state: &[u8]) -> Result<(), StoreError> {
        self.records
            .insert(name.as_str().to_string(), (state.to_vec(), now_millis()));
        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<(DocumentName, u64)>, StoreError> {
        let mut rows: Vec<(DocumentName, u64)> = self
            .records
            .iter()
            .filter_map(|entry| {
                DocumentName::new(entry.key().clone())
                    .ok()
                    .map(|name| (name, entry.value().1))
            })
            .collect();

        rows.sort_by(|a, b| b.1.cmp(&a.1));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn delete(&self, name: &DocumentName) -> Result<bool, StoreError> {
        Ok(self.records.remove(name.as_str()).is_some())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
