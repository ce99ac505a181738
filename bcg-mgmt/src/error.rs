//! Error types for the management node

use bcg_cluster::{ClusterError, DecodeError};
use bcg_store::StoreError;
use speaker_api::ApiError;
use thiserror::Error;

/// Errors returned by zone orchestration and the management API
#[derive(Debug, Error)]
pub enum MgmtError {
    /// A write reached a node that is not the consensus leader
    #[error("not leader")]
    NotLeader,

    /// A leader or speaker could not be mapped to a reachable address
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Unknown zone or speaker
    #[error("{0} not found")]
    NotFound(String),

    /// A peer or speaker could not be reached
    #[error("Network error: {0}")]
    Network(String),

    /// A consensus write did not commit in time; it may still land
    #[error("timed out waiting for the write to commit")]
    Timeout,

    /// The leader answered a forwarded call with an error
    #[error("{message}")]
    Forwarded { code: u16, message: String },

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl From<StoreError> for MgmtError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotLeader => MgmtError::NotLeader,
            StoreError::Timeout => MgmtError::Timeout,
            other => MgmtError::Store(other),
        }
    }
}

impl From<reqwest::Error> for MgmtError {
    fn from(error: reqwest::Error) -> Self {
        MgmtError::Network(error.to_string())
    }
}

impl MgmtError {
    /// HTTP status reported by the management API for this error
    pub fn status_code(&self) -> u16 {
        match self {
            MgmtError::NotFound(_) => 404,
            MgmtError::NotLeader => 409,
            MgmtError::Resolution(_) | MgmtError::Network(_) | MgmtError::Api(_) => 502,
            MgmtError::Timeout => 504,
            MgmtError::Forwarded { code, .. } => *code,
            _ => 500,
        }
    }
}

/// Type alias for results that can return a MgmtError
pub type Result<T> = std::result::Result<T, MgmtError>;
