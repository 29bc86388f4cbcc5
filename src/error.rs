// Error types for wacache
//
// This module defines the error types used throughout the cache.

use thiserror::Error;

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in cache operations
///
/// The enum is `Clone` because a single-flight load broadcasts one outcome
/// to every waiter; foreign errors are flattened to strings on conversion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Empty key on a get or delete
    #[error("key is required")]
    EmptyKey,

    /// Malformed peer address (expected host:port with a numeric port)
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// RPC request named a group this process does not serve
    #[error("group not found: {0}")]
    GroupNotFound(String),

    /// Backing source has no value for the key
    #[error("not found: {0}")]
    NotFound(String),

    /// Backing-source failure other than a miss
    #[error("source error: {0}")]
    Source(String),

    /// Peer RPC failure
    #[error("peer error: {0}")]
    Peer(String),

    /// Service-registry failure
    #[error("registry error: {0}")]
    Registry(String),

    /// Transport-layer failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Second start on a running server
    #[error("server already running")]
    AlreadyRunning,

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}
