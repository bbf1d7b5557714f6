//! Debounced persistence scheduling

use crate::registry::RoomRegistry;
use crate::room::Room;
use dashmap::DashMap;
use padsync_storage::{Store, StoreError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Debounces and coalesces saves of replica state.
///
/// Repeated schedule calls for one document within the debounce window
/// collapse into a single save of the latest state (trailing edge: the
/// window restarts on every call). Saves are at-least-once: a failure
/// leaves the room dirty and its pending entry armed, and the periodic
/// sweep retries it.
pub struct PersistScheduler {
    store: Arc<dyn Store>,
    /// Latest armed debounce generation per document name.
    pending: DashMap<String, u64>,
    generation: AtomicU64,
    debounce: Duration,
}

impl PersistScheduler {
    pub fn new(store: Arc<dyn Store>, debounce: Duration) -> Arc<Self> {
        Arc::new(Self {
            store,
            pending: DashMap::new(),
            generation: AtomicU64::new(0),
            debounce,
        })
    }

    /// Schedule a debounced save of the room's replica state.
    pub fn schedule_save(self: &Arc<Self>, room: &Arc<Room>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.pending
            .insert(room.name().as_str().to_string(), generation);

        let scheduler = Arc::clone(self);
        let room = Arc::clone(room);
        tokio::spawn(async move {
            sleep(scheduler.debounce).await;

            // Only the timer armed by the most recent call fires; earlier
            // timers see a newer generation and stand down.
            let key = room.name().as_str();
            if scheduler.pending.get(key).map(|g| *g) != Some(generation) {
                return;
            }

            if scheduler.save_now(&room).await.is_ok() {
                scheduler.pending.remove_if(key, |_, g| *g == generation);
            }
            // On failure the entry stays armed for the retry sweep.
        });
    }

    /// Save immediately, bypassing the debounce window.
    ///
    /// Called on a room's last disconnect, on idle GC, and at shutdown.
    pub async fn flush(&self, room: &Arc<Room>) -> Result<(), StoreError> {
        let result = self.save_now(room).await;
        if result.is_ok() {
            self.pending.remove(room.name().as_str());
        }
        result
    }

    /// Flush every dirty room; completes before returning.
    /// Returns the number of rooms flushed.
    pub async fn flush_all(&self, registry: &RoomRegistry) -> usize {
        let mut flushed = 0;
        for room in registry.rooms() {
            if room.is_dirty() {
                match self.flush(&room).await {
                    Ok(()) => flushed += 1,
                    Err(e) => warn!(doc = %room.name(), error = %e, "Flush failed"),
                }
            }
        }
        flushed
    }

    /// Documents with an armed debounce timer.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    async fn save_now(&self, room: &Arc<Room>) -> Result<(), StoreError> {
        if !room.is_dirty() {
            return Ok(());
        }

        // Never persist an empty replica: an empty save could clobber a
        // non-empty stored record.
        if room.replica.is_empty() {
            debug!(doc = %room.name(), "Skipping save of empty document");
            room.clear_dirty_at(room.replica.revision());
            return Ok(());
        }

        let revision = room.replica.revision();
        let state = room.replica.full_state();
        match self.store.save(room.name(), &state).await {
            Ok(()) => {
                room.clear_dirty_at(revision);
                debug!(doc = %room.name(), bytes = state.len(), "Persisted document");
                Ok(())
            }
            Err(e) => {
                warn!(doc = %room.name(), error = %e, "Failed to persist document");
                Err(e)
            }
        }
    }
}
