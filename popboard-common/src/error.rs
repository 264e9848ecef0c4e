//! Common error types for popboard

use thiserror::Error;

/// Common result type for popboard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across popboard crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Score document could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Handle failed the length or character-class check
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    /// Client frame could not be understood
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures of the durable store (I/O, connection loss, corrupt
    /// document). Requests hitting these are dropped, never retried.
    pub fn is_storage_unavailable(&self) -> bool {
        match self {
            Error::Database(_) | Error::Io(_) | Error::Serialization(_) => true,
            Error::Config(_)
            | Error::InvalidIdentity(_)
            | Error::Protocol(_)
            | Error::Internal(_) => false,
        }
    }
}
