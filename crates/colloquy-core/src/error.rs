//! Error types for colloquy-core

use thiserror::Error;

use crate::sync::remote::RemoteError;

/// Result type alias using colloquy-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in colloquy-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Object not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Payload bytes failed envelope or body decoding
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Remote record store error
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
}
