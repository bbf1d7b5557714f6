//! Protocol error types

use thiserror::Error;

/// Framing and decoding errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Unknown message type tag: {0}")]
    UnknownMessage(u32),

    #[error("Unknown sync subtype tag: {0}")]
    UnknownSyncType(u32),

    #[error("Frame encoding error: {0}")]
    Encoding(String),
}

/// Result type alias for protocol operations
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
