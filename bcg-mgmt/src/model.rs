//! Views returned to API callers

use serde::{Deserialize, Serialize};
use speaker_api::TrackResponse;

/// A live speaker under management
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speaker {
    pub id: String,
    /// Persisted display name, or the node name when none was set
    pub display_name: String,
}

/// A persisted zone joined with the speakers that are currently live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub display_name: String,
    pub leader_id: String,
    pub speakers: Vec<Speaker>,
}

/// What a speaker is playing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub artist: String,
    pub album: String,
    pub title: String,
    #[serde(default)]
    pub artwork: Vec<u8>,
}

impl From<TrackResponse> for Track {
    fn from(track: TrackResponse) -> Self {
        Self {
            artist: track.artist,
            album: track.album,
            title: track.title,
            artwork: track.artwork,
        }
    }
}
