//! Error types for padsync core

use thiserror::Error;

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid document name: {0}")]
    InvalidDocumentName(String),

    #[error("Malformed update: {0}")]
    MalformedUpdate(String),

    #[error("Malformed state vector: {0}")]
    MalformedStateVector(String),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;
