//! Ephemeral per-connection awareness state

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Connection identifier, unique per accepted transport connection.
pub type ConnectionId = u64;

/// One connection's ephemeral presence metadata (cursor, identity, color).
///
/// The payload is an opaque blob interpreted only by clients.
#[derive(Debug, Clone)]
pub struct AwarenessEntry {
    pub connection_id: ConnectionId,
    pub data: Vec<u8>,
    pub last_seen: Instant,
}

/// Last-write-wins table of awareness entries for one document.
///
/// Entries are never persisted and never touch the replica. An entry is
/// dropped when its connection closes or when it goes silent past the TTL.
pub struct AwarenessTable {
    entries: DashMap<ConnectionId, AwarenessEntry>,
}

impl AwarenessTable {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Record the latest awareness payload for a connection.
    pub fn update(&self, connection_id: ConnectionId, data: Vec<u8>) {
        self.entries.insert(
            connection_id,
            AwarenessEntry {
                connection_id,
                data,
                last_seen: Instant::now(),
            },
        );
    }

    /// Remove a connection's entry. Returns whether one existed.
    pub fn remove(&self, connection_id: ConnectionId) -> bool {
        self.entries.remove(&connection_id).is_some()
    }

    pub fn get(&self, connection_id: ConnectionId) -> Option<AwarenessEntry> {
        self.entries.get(&connection_id).map(|e| e.value().clone())
    }

    pub fn entries(&self) -> Vec<AwarenessEntry> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries whose last update is older than `ttl`.
    /// Returns the number of entries removed.
    pub fn prune(&self, ttl: Duration) -> usize {
        let stale: Vec<ConnectionId> = self
            .entries
            .iter()
            .filter(|e| e.last_seen.elapsed() > ttl)
            .map(|e| *e.key())
            .collect();

        let count = stale.len();
        for id in stale {
            self.entries.remove(&id);
        }
        count
    }
}

impl Default for AwarenessTable {
    fn default() -> Self {
        Self::new()
    }
}
