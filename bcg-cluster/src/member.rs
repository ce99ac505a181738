//! Cluster members as seen by the rest of the system

use std::net::{IpAddr, SocketAddr};

use crate::error::DecodeError;
use crate::meta::{NodeMeta, NodeRole};

/// A live node known to the membership directory.
///
/// Metadata is kept in its encoded form; readers decode it on demand and
/// get a [`DecodeError`] when a peer advertised something malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Unique node name
    pub name: String,
    /// Gossip address of the node
    pub addr: SocketAddr,
    /// Encoded [`NodeMeta`]
    pub meta: Vec<u8>,
}

impl Member {
    pub fn new(name: impl Into<String>, addr: SocketAddr, meta: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            addr,
            meta,
        }
    }

    /// IP address the node is reachable on
    pub fn ip(&self) -> IpAddr {
        self.addr.ip()
    }

    /// Decode the node's advertised metadata
    pub fn meta(&self) -> Result<NodeMeta, DecodeError> {
        NodeMeta::decode(&self.meta)
    }

    /// Whether the node advertises `role`; malformed metadata never matches
    pub fn has_role(&self, role: NodeRole) -> bool {
        self.meta().map(|meta| meta.role == role).unwrap_or(false)
    }
}
