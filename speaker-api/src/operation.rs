//! The operation framework shared by every speaker call

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};

/// Return code a speaker uses for success
pub const RETURN_OK: u16 = 200;

/// A single call on the speaker control surface.
///
/// Each operation is a zero-sized type tying a request to its response and
/// to the action name the speaker routes on.
pub trait SpeakerOperation {
    /// Request body, sent as JSON
    type Request: Serialize;

    /// Typed result of the call
    type Response: DeserializeOwned;

    /// Action name, the last path segment of `/api/<ACTION>`
    const ACTION: &'static str;

    /// Turn the decoded reply body into the typed response
    fn parse_response(body: serde_json::Value) -> Result<Self::Response> {
        serde_json::from_value(body).map_err(|e| ApiError::Parse(e.to_string()))
    }
}

/// Body of calls that take no arguments, sent as `{}`
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EmptyRequest {}

/// Reply of calls that only acknowledge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub return_code: u16,
}

impl Ack {
    /// Fail with [`ApiError::Device`] unless the speaker reported success
    pub fn check(self) -> Result<()> {
        if self.return_code == RETURN_OK {
            Ok(())
        } else {
            Err(ApiError::Device(self.return_code))
        }
    }
}

/// Parse an acknowledgement, treating any non-200 return code as an error
pub(crate) fn parse_ack(body: serde_json::Value) -> Result<()> {
    let ack: Ack = serde_json::from_value(body).map_err(|e| ApiError::Parse(e.to_string()))?;
    ack.check()
}
