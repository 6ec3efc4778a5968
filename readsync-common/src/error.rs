//! Common error types for ReadSync

use thiserror::Error;

/// Common result type for ReadSync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across ReadSync modules
#[derive(Error, Debug)]
pub enum Error {
    /// Session id does not exist in the registry
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Write or subscribe attempted after the session was terminated
    #[error("Session ended: {0}")]
    SessionEnded(String),

    /// Session id already taken at creation
    #[error("Session already exists: {0}")]
    AlreadyExists(String),

    /// Progress report rejected at ingestion (missing or inconsistent fields)
    #[error("Malformed report: {0}")]
    MalformedReport(String),

    /// Feed subscription could not be established
    #[error("Subscription failed: {0}")]
    Subscription(String),

    /// HTTP transport error (client side)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
