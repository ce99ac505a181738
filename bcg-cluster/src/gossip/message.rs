use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Instant;

use crate::member::Member;

/// Largest datagram the receive loop accepts
pub(crate) const MAX_DATAGRAM: usize = 65_507;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeState {
    Alive,
    Suspect,
    Dead,
    Left,
}

impl NodeState {
    /// Alive and suspected nodes are still members
    pub fn is_live(self) -> bool {
        matches!(self, NodeState::Alive | NodeState::Suspect)
    }
}

/// One row of the member table.
///
/// `incarnation` is a logical clock owned by the node itself; a higher value
/// always wins, which is how a node refutes a false suspicion or publishes
/// new metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRecord {
    pub name: String,
    pub addr: SocketAddr,
    pub meta: Vec<u8>,
    pub state: NodeState,
    pub incarnation: u64,

    #[serde(skip)]
    pub last_seen: Option<Instant>,
}

impl MemberRecord {
    pub fn to_member(&self) -> Member {
        Member::new(self.name.clone(), self.addr, self.meta.clone())
    }
}

/// The wire protocol between membership instances.
///
/// - `Join`: sent by a new node to a seed; answered with an `Ack`.
/// - `Ping`/`Ack`: liveness probes, the ack carries the full member table.
/// - `Suspect`/`Alive`: dissemination of health and metadata changes.
/// - `Leave`: graceful departure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GossipMessage {
    Join { node: MemberRecord },
    Ping { node: MemberRecord },
    Ack { node: MemberRecord, members: Vec<MemberRecord> },
    Suspect { name: String, incarnation: u64 },
    Alive { node: MemberRecord },
    Leave { name: String, incarnation: u64 },
}

impl GossipMessage {
    pub fn encode(&self) -> bincode::Result<Vec<u8>> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> bincode::Result<Self> {
        bincode::deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> MemberRecord {
        MemberRecord {
            name: name.to_string(),
            addr: "127.0.0.1:7946".parse().unwrap(),
            meta: vec![1, 2, 3],
            state: NodeState::Alive,
            incarnation: 3,
            last_seen: Some(Instant::now()),
        }
    }

    #[test]
    fn test_ack_carries_member_table() {
        let msg = GossipMessage::Ack {
            node: record("a"),
            members: vec![record("a"), record("b")],
        };

        let decoded = GossipMessage::decode(&msg.encode().unwrap()).unwrap();
        match decoded {
            GossipMessage::Ack { node, members } => {
                assert_eq!(node.name, "a");
                assert_eq!(members.len(), 2);
                assert_eq!(members[1].meta, vec![1, 2, 3]);
                // local timestamps never cross the wire
                assert!(members[1].last_seen.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(GossipMessage::decode(&[0xff, 0xff, 0xff, 0xff, 0xff]).is_err());
    }

    #[test]
    fn test_live_states() {
        assert!(NodeState::Alive.is_live());
        assert!(NodeState::Suspect.is_live());
        assert!(!NodeState::Dead.is_live());
        assert!(!NodeState::Left.is_live());
    }
}
