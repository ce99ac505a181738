//! Node metadata attached to every membership advertisement

use bincode::Options;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ClusterError, DecodeError};

/// Upper bound on encoded metadata, in bytes
pub const META_MAX_SIZE: usize = 512;

/// The role a node plays in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    /// Plays and forwards audio
    Music,
    /// Runs the management API and the replicated store
    Management,
    /// Front proxy for user interfaces
    Frontend,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Music => write!(f, "music"),
            NodeRole::Management => write!(f, "management"),
            NodeRole::Frontend => write!(f, "frontend"),
        }
    }
}

/// Metadata a node advertises about itself.
///
/// Role and ports are fixed for the lifetime of a membership; an update
/// replaces the whole record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMeta {
    pub role: NodeRole,
    pub rtsp_port: u16,
    pub api_port: u16,
    pub raft_port: u16,
}

impl NodeMeta {
    pub fn music(rtsp_port: u16, api_port: u16) -> Self {
        Self {
            role: NodeRole::Music,
            rtsp_port,
            api_port,
            raft_port: 0,
        }
    }

    pub fn management(api_port: u16, raft_port: u16) -> Self {
        Self {
            role: NodeRole::Management,
            rtsp_port: 0,
            api_port,
            raft_port,
        }
    }

    /// Encode into the bounded binary form carried by gossip
    pub fn encode(&self) -> Result<Vec<u8>, ClusterError> {
        codec()
            .serialize(self)
            .map_err(|e| ClusterError::Encode(e.to_string()))
    }

    /// Decode metadata received from a peer
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError("empty metadata".to_string()));
        }
        if bytes.len() > META_MAX_SIZE {
            return Err(DecodeError(format!(
                "metadata is {} bytes, limit is {}",
                bytes.len(),
                META_MAX_SIZE
            )));
        }
        codec()
            .deserialize(bytes)
            .map_err(|e| DecodeError(e.to_string()))
    }
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(META_MAX_SIZE as u64)
        .reject_trailing_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(NodeMeta::music(5000, 7070))]
    #[case(NodeMeta::management(7070, 7080))]
    #[case(NodeMeta { role: NodeRole::Frontend, rtsp_port: 0, api_port: 80, raft_port: 0 })]
    fn test_meta_survives_encoding(#[case] meta: NodeMeta) {
        let bytes = meta.encode().unwrap();
        assert!(bytes.len() <= META_MAX_SIZE);
        assert_eq!(NodeMeta::decode(&bytes).unwrap(), meta);
    }

    #[test]
    fn test_empty_metadata_is_an_error() {
        assert!(NodeMeta::decode(&[]).is_err());
    }

    #[test]
    fn test_unknown_role_is_an_error() {
        let mut bytes = NodeMeta::music(5000, 7070).encode().unwrap();
        // role is the leading variant index
        bytes[0] = 9;
        assert!(NodeMeta::decode(&bytes).is_err());
    }

    #[test]
    fn test_trailing_bytes_are_an_error() {
        let mut bytes = NodeMeta::management(7070, 7080).encode().unwrap();
        bytes.push(0);
        assert!(NodeMeta::decode(&bytes).is_err());
    }

    #[test]
    fn test_oversized_metadata_is_an_error() {
        let bytes = vec![0u8; META_MAX_SIZE + 1];
        let err = NodeMeta::decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("limit"));
    }

    #[test]
    fn test_role_display() {
        assert_eq!(NodeRole::Music.to_string(), "music");
        assert_eq!(NodeRole::Management.to_string(), "management");
        assert_eq!(NodeRole::Frontend.to_string(), "frontend");
    }
}
