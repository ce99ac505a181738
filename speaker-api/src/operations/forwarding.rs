//! Forward target management

use serde::Serialize;

use crate::error::Result;
use crate::operation::{parse_ack, SpeakerOperation};

/// Add nodes the speaker relays its audio to
pub struct ForwardToNodesOperation;

#[derive(Debug, Clone, Serialize)]
pub struct ForwardToNodesRequest {
    pub ids: Vec<String>,
}

impl SpeakerOperation for ForwardToNodesOperation {
    type Request = ForwardToNodesRequest;
    type Response = ();

    const ACTION: &'static str = "ForwardToNodes";

    fn parse_response(body: serde_json::Value) -> Result<()> {
        parse_ack(body)
    }
}

/// Stop relaying to some nodes, or to all of them
pub struct RemoveForwardToNodesOperation;

#[derive(Debug, Clone, Serialize)]
pub struct RemoveForwardToNodesRequest {
    pub ids: Vec<String>,
    /// When set, `ids` is ignored and every target is dropped
    pub remove_all: bool,
}

impl RemoveForwardToNodesRequest {
    pub fn ids(ids: Vec<String>) -> Self {
        Self {
            ids,
            remove_all: false,
        }
    }

    pub fn all() -> Self {
        Self {
            ids: Vec::new(),
            remove_all: true,
        }
    }
}

impl SpeakerOperation for RemoveForwardToNodesOperation {
    type Request = RemoveForwardToNodesRequest;
    type Response = ();

    const ACTION: &'static str = "RemoveForwardToNodes";

    fn parse_response(body: serde_json::Value) -> Result<()> {
        parse_ack(body)
    }
}
