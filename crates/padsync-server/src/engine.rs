//! Engine - composition of registry, scheduler and connection lifecycle

use crate::persist::PersistScheduler;
use crate::registry::RoomRegistry;
use crate::room::{Room, RoomEvent};
use padsync_core::{ConnectionId, DocumentName};
use padsync_storage::Store;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Tunable engine policy values.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Trailing-edge debounce window for persistence.
    pub debounce: Duration,
    /// How long an empty room lingers before it is flushed and removed.
    pub idle_grace: Duration,
    /// Awareness entries older than this are pruned.
    pub awareness_ttl: Duration,
    /// Interval of the retry/prune sweep.
    pub sweep_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(2),
            idle_grace: Duration::from_secs(30),
            awareness_ttl: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// Read-only snapshot for the health endpoint.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub rooms: usize,
    pub connections: usize,
    pub backend: &'static str,
}

/// The shared server engine: room registry, persistence scheduler and
/// connection lifecycle.
pub struct Engine {
    pub registry: RoomRegistry,
    pub scheduler: Arc<PersistScheduler>,
    #[cfg(feature = "metrics")]
    pub metrics: crate::metrics::Metrics,
    store: Arc<dyn Store>,
    config: EngineConfig,
    conn_counter: AtomicU64,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, config: EngineConfig) -> Arc<Self> {
        Arc::new(Self {
            registry: RoomRegistry::new(store.clone()),
            scheduler: PersistScheduler::new(store.clone(), config.debounce),
            #[cfg(feature = "metrics")]
            metrics: crate::metrics::Metrics::new(),
            store,
            config,
            conn_counter: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register a new connection on a document, creating and cold-loading
    /// its room if needed.
    pub async fn connect(
        &self,
        name: &DocumentName,
    ) -> (Arc<Room>, ConnectionId, broadcast::Receiver<RoomEvent>) {
        let id = self.conn_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let (room, rx) = self.registry.checkout(name, id).await;
        debug!(conn = id, doc = %name, peers = room.connection_count(), "Connection joined room");
        #[cfg(feature = "metrics")]
        self.metrics.record_connection();
        (room, id, rx)
    }

    /// Tear down a closed connection: leave the room, best-effort flush,
    /// then the idle-GC grace timer if the room emptied.
    pub fn disconnect(self: &Arc<Self>, room: Arc<Room>, id: ConnectionId) {
        let now_empty = room.leave(id);
        debug!(conn = id, doc = %room.name(), "Connection left room");
        #[cfg(feature = "metrics")]
        self.metrics.record_disconnection();

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = engine.scheduler.flush(&room).await {
                warn!(doc = %room.name(), error = %e, "Flush on disconnect failed");
            }
            if let Some(epoch) = now_empty {
                engine.idle_gc(room, epoch).await;
            }
        });
    }

    /// Grace-timed removal of an idle room. A reconnect during the grace
    /// window bumps the epoch and aborts the removal; a failed flush keeps
    /// the room and retries a window later.
    async fn idle_gc(&self, room: Arc<Room>, epoch: u64) {
        loop {
            tokio::time::sleep(self.config.idle_grace).await;
            if room.connection_count() > 0 || room.idle_epoch() != epoch {
                return;
            }
            match self.scheduler.flush(&room).await {
                Ok(()) => {
                    if self.registry.remove_if_idle(room.name(), epoch) {
                        info!(doc = %room.name(), "Idle room flushed and removed");
                    }
                    return;
                }
                Err(e) => {
                    warn!(doc = %room.name(), error = %e, "Flush before removal failed, retrying");
                }
            }
        }
    }

    /// Periodic maintenance: retry failed saves and prune stale awareness.
    /// Runs until the process exits.
    pub async fn run_sweeper(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.config.sweep_interval).await;
            for room in self.registry.rooms() {
                let pruned = room.awareness.prune(self.config.awareness_ttl);
                if pruned > 0 {
                    debug!(doc = %room.name(), pruned, "Pruned stale awareness entries");
                }
                if room.is_dirty() {
                    if let Err(e) = self.scheduler.flush(&room).await {
                        warn!(doc = %room.name(), error = %e, "Sweep flush failed");
                    }
                }
            }
        }
    }

    /// Flush everything to the store; completes before returning.
    /// Called on receipt of a termination signal.
    pub async fn shutdown(&self) -> usize {
        let flushed = self.scheduler.flush_all(&self.registry).await;
        info!(flushed, "Flushed documents on shutdown");
        flushed
    }

    /// Introspection snapshot for the health endpoint.
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            rooms: self.registry.len(),
            connections: self.registry.connection_count(),
            backend: self.store.backend(),
        }
    }

    /// Most recently persisted documents, newest first.
    pub async fn list_documents(
        &self,
        limit: usize,
    ) -> Result<Vec<(DocumentName, u64)>, padsync_storage::StoreError> {
        self.store.list(limit).await
    }
}
