//! Room registry - maps document names to live rooms

use crate::room::{Room, RoomEvent};
use dashmap::DashMap;
use padsync_core::{ConnectionId, DocumentName};
use padsync_storage::Store;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Maps each document name to its single live in-memory room.
///
/// Construction is single-winner under concurrent lookups for the same
/// name: every racer gets the same `Room` instance, and the cold load from
/// the store completes exactly once before any of them proceeds with sync.
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<Room>>,
    store: Arc<dyn Store>,
}

impl RoomRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            rooms: DashMap::new(),
            store,
        }
    }

    /// Get the live room for `name`, creating and cold-loading it if needed.
    pub async fn get_or_create(&self, name: &DocumentName) -> Arc<Room> {
        let room = self
            .rooms
            .entry(name.as_str().to_string())
            .or_insert_with(|| {
                info!(doc = %name, "Creating room");
                Room::new(name.clone())
            })
            .value()
            .clone();

        self.ensure_loaded(&room).await;
        room
    }

    /// Get or create the room for `name` and register a connection on it in
    /// one step. The join happens under the map's entry guard, so it cannot
    /// interleave with [`RoomRegistry::remove_if_idle`].
    pub async fn checkout(
        &self,
        name: &DocumentName,
        id: ConnectionId,
    ) -> (Arc<Room>, broadcast::Receiver<RoomEvent>) {
        let (room, rx) = {
            let entry = self
                .rooms
                .entry(name.as_str().to_string())
                .or_insert_with(|| {
                    info!(doc = %name, "Creating room");
                    Room::new(name.clone())
                });
            let room = entry.value().clone();
            let rx = room.join(id);
            (room, rx)
        };

        self.ensure_loaded(&room).await;
        (room, rx)
    }

    async fn ensure_loaded(&self, room: &Arc<Room>) {
        room.loaded
            .get_or_init(|| async {
                match self.store.load(room.name()).await {
                    Ok(Some(record)) if !record.state.is_empty() => {
                        match room.replica.apply_update(&record.state) {
                            Ok(()) => {
                                room.touch(record.updated_at);
                                info!(
                                    doc = %room.name(),
                                    bytes = record.state.len(),
                                    "Loaded document from store"
                                );
                            }
                            Err(e) => {
                                warn!(doc = %room.name(), error = %e, "Discarding corrupt stored state");
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        // Treated as no prior state; the room starts empty.
                        warn!(doc = %room.name(), error = %e, "Load failed, starting empty");
                    }
                }
            })
            .await;
    }

    /// Fetch a live room without creating one.
    pub fn get(&self, name: &DocumentName) -> Option<Arc<Room>> {
        self.rooms.get(name.as_str()).map(|r| r.value().clone())
    }

    /// Remove a room from the registry. Idempotent.
    pub fn remove(&self, name: &DocumentName) {
        if self.rooms.remove(name.as_str()).is_some() {
            info!(doc = %name, "Removed room");
        }
    }

    /// Remove the room only if it is still empty and its idle epoch is
    /// unchanged. The check runs under the map's entry guard, so a
    /// concurrent [`RoomRegistry::checkout`] either lands before the check
    /// (and prevents removal) or observes a fresh room afterwards.
    pub(crate) fn remove_if_idle(&self, name: &DocumentName, epoch: u64) -> bool {
        self.rooms
            .remove_if(name.as_str(), |_, room| {
                room.connection_count() == 0 && room.idle_epoch() == epoch
            })
            .is_some()
    }

    /// `(name, last-updated millis)` for every live room.
    pub fn list(&self) -> Vec<(DocumentName, u64)> {
        self.rooms
            .iter()
            .map(|entry| (entry.value().name().clone(), entry.value().last_updated()))
            .collect()
    }

    pub fn rooms(&self) -> Vec<Arc<Room>> {
        self.rooms.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Total connections across all live rooms.
    pub fn connection_count(&self) -> usize {
        self.rooms
            .iter()
            .map(|entry| entry.value().connection_count())
            .sum()
    }
}
