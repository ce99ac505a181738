//! Service name and broadcast toggling

use serde::Serialize;

use crate::error::Result;
use crate::operation::{parse_ack, SpeakerOperation};

/// Rename the speaker's advertised service
pub struct ChangeServiceNameOperation;

#[derive(Debug, Clone, Serialize)]
pub struct ChangeServiceNameRequest {
    pub new_name: String,
}

impl SpeakerOperation for ChangeServiceNameOperation {
    type Request = ChangeServiceNameRequest;
    type Response = ();

    const ACTION: &'static str = "ChangeServiceName";

    fn parse_response(body: serde_json::Value) -> Result<()> {
        parse_ack(body)
    }
}

/// Turn the speaker's own service advertisement on or off.
///
/// A speaker that is not broadcasting cannot be picked as an audio target by
/// a source; zone members stay quiet while their leader feeds them.
pub struct ToggleBroadcastOperation;

#[derive(Debug, Clone, Serialize)]
pub struct ToggleBroadcastRequest {
    pub should_broadcast: bool,
}

impl SpeakerOperation for ToggleBroadcastOperation {
    type Request = ToggleBroadcastRequest;
    type Response = ();

    const ACTION: &'static str = "ToggleBroadcast";

    fn parse_response(body: serde_json::Value) -> Result<()> {
        parse_ack(body)
    }
}
