//! Per-connection sync protocol state machine

use crate::room::Room;
use bytes::Bytes;
use padsync_core::ConnectionId;
use padsync_protocol::{Message, ProtocolError, SyncMessage};
use std::sync::Arc;
use tracing::debug;

/// Lifecycle of one synchronizing connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Syncing,
    Live,
    Closed,
}

/// What the transport must do with the outcome of one inbound frame.
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    /// Send these bytes back to this connection.
    Reply(Vec<u8>),
    /// Forward the original frame to every other connection in the room.
    Fanout(Bytes),
    /// The replica changed; schedule a persistence pass.
    Persist,
}

/// A frame that could not be processed. The transport discards the frame
/// and keeps the connection open; session state is unchanged.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Replica(#[from] padsync_core::Error),
}

/// Drives the sync handshake and live update exchange for one connection.
///
/// The session never touches the replica except through merge operations,
/// and never blocks: every transition is driven by a received frame or by
/// transport close.
pub struct SyncSession {
    id: ConnectionId,
    room: Arc<Room>,
    state: SessionState,
    sent_diff: bool,
    applied_remote: bool,
}

impl SyncSession {
    pub fn new(id: ConnectionId, room: Arc<Room>) -> Self {
        Self {
            id,
            room,
            state: SessionState::Connecting,
            sent_diff: false,
            applied_remote: false,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The opening frame: our state vector, inviting the peer's diff.
    /// Transitions `Connecting -> Syncing`.
    pub fn start(&mut self) -> Vec<u8> {
        self.state = SessionState::Syncing;
        Message::sync_step1(self.room.replica.state_vector()).encode()
    }

    /// Handle one inbound frame, returning the transport actions it caused.
    pub fn handle_frame(&mut self, raw: &[u8]) -> Result<Vec<Action>, SessionError> {
        match Message::decode(raw)? {
            Message::Sync(SyncMessage::SyncStep1(remote_sv)) => {
                let converged = remote_sv == self.room.replica.state_vector();
                let diff = self.room.replica.diff_since(&remote_sv)?;
                self.sent_diff = true;
                if converged {
                    // Nothing to send and nothing to receive.
                    self.applied_remote = true;
                }
                self.advance();
                Ok(vec![Action::Reply(Message::sync_step2(diff).encode())])
            }
            Message::Sync(SyncMessage::SyncStep2(update))
            | Message::Sync(SyncMessage::Update(update)) => {
                let before = self.room.replica.state_vector();
                self.room.replica.apply_update(&update)?;
                if self.room.replica.state_vector() != before {
                    self.room.mark_dirty();
                }
                self.applied_remote = true;
                self.advance();
                Ok(vec![
                    Action::Persist,
                    Action::Fanout(Bytes::copy_from_slice(raw)),
                ])
            }
            Message::Awareness(payload) => {
                // Awareness never touches the replica and is never persisted.
                self.room.awareness.update(self.id, payload);
                Ok(vec![Action::Fanout(Bytes::copy_from_slice(raw))])
            }
        }
    }

    /// Transport closed or errored.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    fn advance(&mut self) {
        if self.state == SessionState::Syncing && self.sent_diff && self.applied_remote {
            self.state = SessionState::Live;
            debug!(conn = self.id, doc = %self.room.name(), "Connection live");
        }
    }
}
