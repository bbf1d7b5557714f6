//! Rooms: one document's replica plus its active connections

use bytes::Bytes;
use padsync_core::{AwarenessTable, ConnectionId, DocumentName, Replica};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, OnceCell};

/// Frames buffered per fan-out receiver before a lagging one drops.
const FANOUT_CAPACITY: usize = 256;

/// A frame fanned out to a room's connections.
#[derive(Debug, Clone)]
pub struct RoomEvent {
    /// Connection that originated the frame; its own receiver skips it.
    pub from: ConnectionId,
    pub payload: Bytes,
}

/// The in-memory unit grouping one document's replica with its active
/// connections and their awareness state.
///
/// All connections subscribed to a name observe the same `Room` instance;
/// there are no per-connection copies of durable state. Connection
/// bookkeeping is linearized under a mutex that is never held across an
/// await point.
pub struct Room {
    name: DocumentName,
    pub replica: Replica,
    pub awareness: AwarenessTable,
    conns: Mutex<HashSet<ConnectionId>>,
    /// Bumped on join and on transition-to-empty; a grace timer only removes
    /// the room if the epoch it captured is still current.
    idle_epoch: AtomicU64,
    /// Replica has changes not yet persisted.
    dirty: AtomicBool,
    last_updated: AtomicU64,
    /// Runs the cold load from the store exactly once.
    pub(crate) loaded: OnceCell<()>,
    events: broadcast::Sender<RoomEvent>,
}

impl Room {
    pub(crate) fn new(name: DocumentName) -> Arc<Self> {
        let (events, _) = broadcast::channel(FANOUT_CAPACITY);
        Arc::new(Self {
            name,
            replica: Replica::new(),
            awareness: AwarenessTable::new(),
            conns: Mutex::new(HashSet::new()),
            idle_epoch: AtomicU64::new(0),
            dirty: AtomicBool::new(false),
            last_updated: AtomicU64::new(now_millis()),
            loaded: OnceCell::new(),
            events,
        })
    }

    pub fn name(&self) -> &DocumentName {
        &self.name
    }

    /// Register a connection; returns its fan-out receiver.
    pub fn join(&self, id: ConnectionId) -> broadcast::Receiver<RoomEvent> {
        let mut conns = self.conns.lock();
        conns.insert(id);
        // A rejoin during the idle grace window invalidates pending removal.
        self.idle_epoch.fetch_add(1, Ordering::SeqCst);
        self.events.subscribe()
    }

    /// Deregister a connection and drop its awareness entry.
    ///
    /// When the room becomes empty this returns the idle epoch the grace
    /// timer must re-check before removing the room.
    pub fn leave(&self, id: ConnectionId) -> Option<u64> {
        let mut conns = self.conns.lock();
        conns.remove(&id);
        self.awareness.remove(id);
        if conns.is_empty() {
            Some(self.idle_epoch.fetch_add(1, Ordering::SeqCst) + 1)
        } else {
            None
        }
    }

    pub fn connection_count(&self) -> usize {
        self.conns.lock().len()
    }

    pub(crate) fn idle_epoch(&self) -> u64 {
        self.idle_epoch.load(Ordering::SeqCst)
    }

    /// Fan a frame out to every other connection in the room.
    ///
    /// Best-effort: a lagged receiver drops frames without blocking the
    /// sender or its siblings.
    pub fn fanout(&self, from: ConnectionId, payload: Bytes) {
        let _ = self.events.send(RoomEvent { from, payload });
    }

    /// Mark the replica as having unpersisted changes.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
        self.touch(now_millis());
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Clear the dirty flag unless an update arrived past `revision`.
    pub(crate) fn clear_dirty_at(&self, revision: u64) {
        if self.replica.revision() == revision {
            self.dirty.store(false, Ordering::SeqCst);
        }
    }

    pub(crate) fn touch(&self, millis: u64) {
        self.last_updated.store(millis, Ordering::SeqCst);
    }

    /// Unix milliseconds of the last change or load.
    pub fn last_updated(&self) -> u64 {
        self.last_updated.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("name", &self.name)
            .field("connections", &self.connection_count())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
