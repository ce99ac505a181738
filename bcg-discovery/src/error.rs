//! Error types for cluster discovery.

use std::fmt;

/// Error type for discovery operations.
///
/// Discovery only fails when the local sockets cannot be set up or the
/// advertised data cannot be framed. A search that finds nothing is not an
/// error; it yields `None`.
#[derive(Debug)]
pub enum DiscoveryError {
    /// Socket creation, multicast membership or send failures
    NetworkError(String),
    /// Instance name that cannot be carried in a header line
    InvalidName(String),
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DiscoveryError::InvalidName(name) => write!(f, "Invalid instance name: {:?}", name),
        }
    }
}

impl std::error::Error for DiscoveryError {}

/// Convenience Result type alias for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;
