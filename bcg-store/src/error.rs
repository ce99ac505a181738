//! Error types for the replicated store

use thiserror::Error;

/// Errors returned by [`DistributedStore`](crate::DistributedStore)
#[derive(Debug, Error)]
pub enum StoreError {
    /// A write reached a node that does not hold leadership
    #[error("not leader")]
    NotLeader,

    /// The write was not committed within the apply timeout; it may still land
    #[error("timed out waiting for the write to commit")]
    Timeout,

    /// The consensus layer refused or failed the request
    #[error("Raft error: {0}")]
    Raft(String),

    /// Durable log, vote or snapshot files could not be used
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Type alias for results that can return a StoreError
pub type Result<T> = std::result::Result<T, StoreError>;
