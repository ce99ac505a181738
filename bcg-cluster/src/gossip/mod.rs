//! SWIM-style gossip over UDP

mod message;
mod service;

pub use message::{GossipMessage, MemberRecord, NodeState};
pub use service::{Membership, MembershipConfig};
