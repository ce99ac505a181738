//! Replicated records and the consensus type configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;

/// Consensus node id
pub type NodeId = u64;

/// Persisted settings of one speaker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerConfig {
    pub id: String,
    pub display_name: String,
}

/// Persisted settings of one zone.
///
/// `leader_id` is empty while the zone has no leader. `speakers` keeps the
/// order members were added in; leader promotion relies on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub id: String,
    pub display_name: String,
    pub leader_id: String,
    pub speakers: Vec<String>,
}

/// A value in the replicated map.
///
/// Exactly one side is populated in practice; an entry whose zone id is
/// non-empty is a zone, anything else is a speaker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub speaker_config: SpeakerConfig,
    #[serde(default)]
    pub zone_config: ZoneConfig,
}

impl Entry {
    pub fn speaker(config: SpeakerConfig) -> Self {
        Self {
            speaker_config: config,
            ..Default::default()
        }
    }

    pub fn zone(config: ZoneConfig) -> Self {
        Self {
            zone_config: config,
            ..Default::default()
        }
    }

    pub fn is_zone(&self) -> bool {
        !self.zone_config.id.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Set,
    Delete,
}

/// The unit of replication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub op: Op,
    pub key: String,
    #[serde(default)]
    pub value: Entry,
}

impl Command {
    pub fn set(key: impl Into<String>, value: Entry) -> Self {
        Self {
            op: Op::Set,
            key: key.into(),
            value,
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            op: Op::Delete,
            key: key.into(),
            value: Entry::default(),
        }
    }
}

/// Result of applying a [`Command`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Applied;

/// A management node as the consensus layer knows it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreNode {
    /// Unique node name, as gossiped
    pub name: String,
    /// `host:port` of the consensus RPC endpoint
    pub addr: String,
}

impl StoreNode {
    pub fn new(name: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
        }
    }
}

impl fmt::Display for StoreNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.addr)
    }
}

openraft::declare_raft_types!(
    pub TypeConfig:
        D = Command,
        R = Applied,
        NodeId = NodeId,
        Node = StoreNode,
        Entry = openraft::Entry<TypeConfig>,
        SnapshotData = Cursor<Vec<u8>>,
        AsyncRuntime = openraft::TokioRuntime
);

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Consensus id of the node called `name` (64-bit FNV-1a)
pub fn node_id(name: &str) -> NodeId {
    name.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", 0xcbf2_9ce4_8422_2325)]
    #[case("a", 0xaf63_dc4c_8601_ec8c)]
    #[case("foobar", 0x8594_4171_f739_67e8)]
    fn test_node_id_is_fnv1a(#[case] name: &str, #[case] expected: u64) {
        assert_eq!(node_id(name), expected);
    }

    #[test]
    fn test_entry_kind() {
        let zone = Entry::zone(ZoneConfig {
            id: "42".to_string(),
            ..Default::default()
        });
        assert!(zone.is_zone());

        let speaker = Entry::speaker(SpeakerConfig {
            id: "kitchen".to_string(),
            display_name: "Kitchen".to_string(),
        });
        assert!(!speaker.is_zone());
    }

    #[test]
    fn test_command_wire_format() {
        let json = serde_json::to_value(Command::delete("42")).unwrap();
        assert_eq!(json["op"], "delete");
        assert_eq!(json["key"], "42");

        let parsed: Command =
            serde_json::from_str(r#"{"op":"set","key":"k","value":{"speaker_config":{"id":"k","display_name":"K"}}}"#)
                .unwrap();
        assert_eq!(parsed.op, Op::Set);
        assert_eq!(parsed.value.speaker_config.display_name, "K");
        assert!(!parsed.value.is_zone());
    }
}
