//! Crate-level error type

use thiserror::Error;

use crate::hub::HubError;

/// Errors surfaced by the server and other transport-facing code
#[derive(Debug, Error)]
pub enum Error {
    /// Hub rejected the operation
    #[error(transparent)]
    Hub(#[from] HubError),

    /// Socket I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be encoded or decoded
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A client sent a frame longer than the configured limit
    #[error("Frame exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Protocol(e.to_string())
    }
}

/// Result alias using the crate error type
pub type Result<T> = std::result::Result<T, Error>;
