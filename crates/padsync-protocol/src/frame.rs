//! Frame encoding and decoding

use crate::error::{ProtocolError, ProtocolResult};
use yrs::encoding::read::{Cursor, Read};
use yrs::encoding::write::Write;
use yrs::updates::decoder::DecoderV1;
use yrs::updates::encoder::{Encoder, EncoderV1};

/// Top-level tag for document sync messages.
pub const MSG_SYNC: u32 = 0;
/// Top-level tag for awareness messages.
pub const MSG_AWARENESS: u32 = 1;

const SYNC_STEP1: u32 = 0;
const SYNC_STEP2: u32 = 1;
const SYNC_UPDATE: u32 = 2;

/// Document synchronization payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    /// A peer's state vector, inviting the diff it is missing.
    SyncStep1(Vec<u8>),
    /// The diff answering a SyncStep1.
    SyncStep2(Vec<u8>),
    /// An incremental document update.
    Update(Vec<u8>),
}

/// A decoded wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Sync(SyncMessage),
    /// Opaque presence payload, interpreted only by clients.
    Awareness(Vec<u8>),
}

impl Message {
    pub fn sync_step1(state_vector: Vec<u8>) -> Self {
        Message::Sync(SyncMessage::SyncStep1(state_vector))
    }

    pub fn sync_step2(update: Vec<u8>) -> Self {
        Message::Sync(SyncMessage::SyncStep2(update))
    }

    pub fn update(update: Vec<u8>) -> Self {
        Message::Sync(SyncMessage::Update(update))
    }

    pub fn awareness(payload: Vec<u8>) -> Self {
        Message::Awareness(payload)
    }

    /// Serialize to wire bytes: a varint type tag (plus a varint subtype for
    /// sync messages) followed by the length-prefixed payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = EncoderV1::new();
        match self {
            Message::Sync(sync) => {
                encoder.write_var(MSG_SYNC);
                match sync {
                    SyncMessage::SyncStep1(state_vector) => {
                        encoder.write_var(SYNC_STEP1);
                        encoder.write_buf(state_vector);
                    }
                    SyncMessage::SyncStep2(update) => {
                        encoder.write_var(SYNC_STEP2);
                        encoder.write_buf(update);
                    }
                    SyncMessage::Update(update) => {
                        encoder.write_var(SYNC_UPDATE);
                        encoder.write_buf(update);
                    }
                }
            }
            Message::Awareness(payload) => {
                encoder.write_var(MSG_AWARENESS);
                encoder.write_buf(payload);
            }
        }
        encoder.to_vec()
    }

    /// Parse one frame from wire bytes.
    pub fn decode(data: &[u8]) -> ProtocolResult<Self> {
        let mut decoder = DecoderV1::new(Cursor::new(data));
        let tag: u32 = decoder
            .read_var()
            .map_err(|e| ProtocolError::Encoding(e.to_string()))?;

        match tag {
            MSG_SYNC => {
                let subtag: u32 = decoder
                    .read_var()
                    .map_err(|e| ProtocolError::Encoding(e.to_string()))?;
                let payload = decoder
                    .read_buf()
                    .map_err(|e| ProtocolError::Encoding(e.to_string()))?
                    .to_vec();
                match subtag {
                    SYNC_STEP1 => Ok(Message::Sync(SyncMessage::SyncStep1(payload))),
                    SYNC_STEP2 => Ok(Message::Sync(SyncMessage::SyncStep2(payload))),
                    SYNC_UPDATE => Ok(Message::Sync(SyncMessage::Update(payload))),
                    other => Err(ProtocolError::UnknownSyncType(other)),
                }
            }
            MSG_AWARENESS => {
                let payload = decoder
                    .read_buf()
                    .map_err(|e| ProtocolError::Encoding(e.to_string()))?
                    .to_vec();
                Ok(Message::Awareness(payload))
            }
            other => Err(ProtocolError::UnknownMessage(other)),
        }
    }
}
