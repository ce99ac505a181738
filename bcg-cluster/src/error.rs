//! Error types for the membership directory

use thiserror::Error;

/// Node metadata could not be decoded.
///
/// Malformed metadata means the peer speaks an incompatible protocol. It is
/// never turned into a default record, since that would give the node a role
/// it does not have.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed node metadata: {0}")]
pub struct DecodeError(pub String);

/// Errors raised by the membership directory
#[derive(Debug, Error)]
pub enum ClusterError {
    /// A seed could not be reached or did not answer a join
    #[error("Network error: {0}")]
    Network(String),

    /// Local socket failures
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Node metadata could not be encoded within its size bound
    #[error("Failed to encode node metadata: {0}")]
    Encode(String),

    /// Node metadata could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Type alias for results that can return a ClusterError
pub type Result<T> = std::result::Result<T, ClusterError>;
