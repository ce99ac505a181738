//! Read-only playback state

use serde::{Deserialize, Serialize};

use crate::operation::{EmptyRequest, SpeakerOperation};

/// Metadata of the track currently playing
pub struct GetCurrentTrackOperation;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackResponse {
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artwork: Vec<u8>,
}

impl SpeakerOperation for GetCurrentTrackOperation {
    type Request = EmptyRequest;
    type Response = TrackResponse;

    const ACTION: &'static str = "GetCurrentTrack";
}

/// Whether the speaker's output is hard-muted
pub struct GetMutedOperation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutedResponse {
    pub is_muted: bool,
}

impl SpeakerOperation for GetMutedOperation {
    type Request = EmptyRequest;
    type Response = MutedResponse;

    const ACTION: &'static str = "GetMuted";
}
