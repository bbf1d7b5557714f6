//! padsync wire protocol
//!
//! Messages are binary frames whose first field is a variable-length
//! unsigned integer message-type tag:
//!
//! ```text
//! 0 (sync)       subtype 0: SyncStep1 <state vector>
//!                subtype 1: SyncStep2 <update>
//!                subtype 2: Update    <update>
//! 1 (awareness)  <opaque payload>
//! ```
//!
//! Payload buffers carry a varint length prefix in the same encoding.

pub mod error;
pub mod frame;

pub use error::{ProtocolError, ProtocolResult};
pub use frame::{Message, SyncMessage, MSG_AWARENESS, MSG_SYNC};
