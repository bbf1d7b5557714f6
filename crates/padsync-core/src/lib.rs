//! padsync core - mergeable replica and awareness primitives
//!
//! This crate provides the algorithmic heart of padsync:
//! - Mergeable document replicas with state-vector based minimal diffs
//! - Document naming
//! - Ephemeral per-connection awareness state

pub mod awareness;
pub mod error;
pub mod name;
pub mod replica;

pub use awareness::{AwarenessEntry, AwarenessTable, ConnectionId};
pub use error::{Error, Result};
pub use name::{DocumentName, DEFAULT_DOCUMENT};
pub use replica::Replica;
