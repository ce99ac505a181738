//! Request and reply bodies of the management API

use serde::{Deserialize, Serialize};

use crate::error::MgmtError;

/// Every reply is wrapped in this envelope; `code` 200 means success
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: 200,
            message: "OK".to_string(),
            data: Some(data),
        }
    }

    pub fn error(error: &MgmtError) -> Self {
        Self {
            code: error.status_code(),
            message: error.to_string(),
            data: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == 200
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetDisplayNameRequest {
    pub display_name: String,
    #[serde(default)]
    pub update_remote: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuteState {
    pub is_muted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateZoneRequest {
    pub display_name: String,
    #[serde(default)]
    pub speaker_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateZoneResponse {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerIdsRequest {
    pub speaker_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneNameRequest {
    pub display_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_envelope_has_no_data() {
        let envelope = Envelope::<()>::error(&MgmtError::NotFound("zone 7".into()));
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json, serde_json::json!({ "code": 404, "message": "zone 7 not found" }));
    }

    #[test]
    fn test_ok_envelope() {
        let envelope = Envelope::ok(CreateZoneResponse { id: "42".into() });
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "code": 200, "message": "OK", "data": { "id": "42" } })
        );
    }

    #[test]
    fn test_optional_request_fields() {
        let req: SetDisplayNameRequest =
            serde_json::from_str(r#"{ "display_name": "Kitchen" }"#).unwrap();
        assert!(!req.update_remote);

        let req: CreateZoneRequest = serde_json::from_str(r#"{ "display_name": "Up" }"#).unwrap();
        assert!(req.speaker_ids.is_empty());
    }
}
