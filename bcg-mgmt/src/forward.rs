//! Handing mutating calls to the consensus leader

use async_trait::async_trait;
use std::net::SocketAddr;

use crate::error::Result;

/// A mutating call re-issued against the leader's management API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardedCall {
    SetDisplayName {
        speaker_id: String,
        display_name: String,
        update_remote: bool,
    },
    CreateZone {
        display_name: String,
        speaker_ids: Vec<String>,
    },
    AddSpeakersToZone {
        zone_id: String,
        speaker_ids: Vec<String>,
    },
    RemoveSpeakersFromZone {
        zone_id: String,
        speaker_ids: Vec<String>,
    },
    DeleteZone {
        zone_id: String,
    },
    ChangeZoneName {
        zone_id: String,
        display_name: String,
    },
    SetMute {
        speaker_id: String,
        is_muted: bool,
    },
}

/// What the leader answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardedReply {
    Done,
    ZoneCreated(String),
}

/// Carries a [`ForwardedCall`] to the leader.
///
/// A non-success reply comes back as `MgmtError::Forwarded` carrying the
/// leader's message unchanged.
#[async_trait]
pub trait LeaderForwarder: Send + Sync {
    async fn forward(&self, leader_api: SocketAddr, call: ForwardedCall) -> Result<ForwardedReply>;
}
