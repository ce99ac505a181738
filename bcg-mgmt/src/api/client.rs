//! HTTP client for the management API

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::debug;

use super::messages::{
    CreateZoneRequest, CreateZoneResponse, Envelope, MuteState, SetDisplayNameRequest,
    SpeakerIdsRequest, ZoneNameRequest,
};
use crate::error::{MgmtError, Result};
use crate::forward::{ForwardedCall, ForwardedReply, LeaderForwarder};
use crate::model::{Speaker, Track, Zone};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Zone operations fan out to several speakers, each bounded on its own
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Talks to the management API of any management node.
///
/// Followers use it to forward writes to the leader; front-ends can use it
/// directly.
#[derive(Debug, Clone)]
pub struct MgmtClient {
    http: Client,
}

impl MgmtClient {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| MgmtError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    async fn call<B, T>(
        &self,
        method: Method,
        addr: SocketAddr,
        path: &str,
        body: Option<&B>,
    ) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("http://{}{}", addr, path);
        debug!(%method, %url, "calling management API");

        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| MgmtError::Network(format!("invalid reply from {}: {}", url, e)))?;

        if !envelope.is_ok() {
            return Err(MgmtError::Forwarded {
                code: envelope.code,
                message: envelope.message,
            });
        }
        Ok(envelope.data)
    }

    async fn call_expecting<B, T>(
        &self,
        method: Method,
        addr: SocketAddr,
        path: &str,
        body: Option<&B>,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call(method, addr, path, body)
            .await?
            .ok_or_else(|| MgmtError::Network(format!("reply from {}{} carried no data", addr, path)))
    }

    pub async fn speakers(&self, addr: SocketAddr) -> Result<Vec<Speaker>> {
        self.call_expecting::<(), _>(Method::GET, addr, "/speakers", None)
            .await
    }

    pub async fn set_display_name(
        &self,
        addr: SocketAddr,
        speaker_id: &str,
        display_name: &str,
        update_remote: bool,
    ) -> Result<()> {
        let body = SetDisplayNameRequest {
            display_name: display_name.to_string(),
            update_remote,
        };
        let path = format!("/speakers/{}/name", speaker_id);
        self.call::<_, ()>(Method::PUT, addr, &path, Some(&body))
            .await
            .map(|_| ())
    }

    pub async fn speaker_track(&self, addr: SocketAddr, speaker_id: &str) -> Result<Track> {
        let path = format!("/speakers/{}/track", speaker_id);
        self.call_expecting::<(), _>(Method::GET, addr, &path, None)
            .await
    }

    pub async fn is_muted(&self, addr: SocketAddr, speaker_id: &str) -> Result<bool> {
        let path = format!("/speakers/{}/mute", speaker_id);
        let state: MuteState = self
            .call_expecting::<(), _>(Method::GET, addr, &path, None)
            .await?;
        Ok(state.is_muted)
    }

    pub async fn set_mute(&self, addr: SocketAddr, speaker_id: &str, is_muted: bool) -> Result<()> {
        let path = format!("/speakers/{}/mute", speaker_id);
        self.call::<_, ()>(Method::PUT, addr, &path, Some(&MuteState { is_muted }))
            .await
            .map(|_| ())
    }

    pub async fn zones(&self, addr: SocketAddr) -> Result<Vec<Zone>> {
        self.call_expecting::<(), _>(Method::GET, addr, "/zones", None)
            .await
    }

    /// Create a zone and return its id
    pub async fn create_zone(
        &self,
        addr: SocketAddr,
        display_name: &str,
        speaker_ids: &[String],
    ) -> Result<String> {
        let body = CreateZoneRequest {
            display_name: display_name.to_string(),
            speaker_ids: speaker_ids.to_vec(),
        };
        let created: CreateZoneResponse = self
            .call_expecting(Method::POST, addr, "/zones", Some(&body))
            .await?;
        Ok(created.id)
    }

    pub async fn add_speakers_to_zone(
        &self,
        addr: SocketAddr,
        zone_id: &str,
        speaker_ids: &[String],
    ) -> Result<()> {
        let body = SpeakerIdsRequest {
            speaker_ids: speaker_ids.to_vec(),
        };
        let path = format!("/zones/{}/speakers", zone_id);
        self.call::<_, ()>(Method::POST, addr, &path, Some(&body))
            .await
            .map(|_| ())
    }

    pub async fn remove_speakers_from_zone(
        &self,
        addr: SocketAddr,
        zone_id: &str,
        speaker_ids: &[String],
    ) -> Result<()> {
        let body = SpeakerIdsRequest {
            speaker_ids: speaker_ids.to_vec(),
        };
        let path = format!("/zones/{}/speakers/remove", zone_id);
        self.call::<_, ()>(Method::POST, addr, &path, Some(&body))
            .await
            .map(|_| ())
    }

    pub async fn change_zone_name(&self, addr: SocketAddr, zone_id: &str, display_name: &str) -> Result<()> {
        let body = ZoneNameRequest {
            display_name: display_name.to_string(),
        };
        let path = format!("/zones/{}/name", zone_id);
        self.call::<_, ()>(Method::PUT, addr, &path, Some(&body))
            .await
            .map(|_| ())
    }

    pub async fn delete_zone(&self, addr: SocketAddr, zone_id: &str) -> Result<()> {
        let path = format!("/zones/{}", zone_id);
        self.call::<(), ()>(Method::DELETE, addr, &path, None)
            .await
            .map(|_| ())
    }

    pub async fn zone_track(&self, addr: SocketAddr, zone_id: &str) -> Result<Track> {
        let path = format!("/zones/{}/track", zone_id);
        self.call_expecting::<(), _>(Method::GET, addr, &path, None)
            .await
    }
}

#[async_trait]
impl LeaderForwarder for MgmtClient {
    async fn forward(&self, leader_api: SocketAddr, call: ForwardedCall) -> Result<ForwardedReply> {
        match call {
            ForwardedCall::SetDisplayName {
                speaker_id,
                display_name,
                update_remote,
            } => {
                self.set_display_name(leader_api, &speaker_id, &display_name, update_remote)
                    .await?
            }
            ForwardedCall::CreateZone {
                display_name,
                speaker_ids,
            } => {
                let id = self
                    .create_zone(leader_api, &display_name, &speaker_ids)
                    .await?;
                return Ok(ForwardedReply::ZoneCreated(id));
            }
            ForwardedCall::AddSpeakersToZone {
                zone_id,
                speaker_ids,
            } => {
                self.add_speakers_to_zone(leader_api, &zone_id, &speaker_ids)
                    .await?
            }
            ForwardedCall::RemoveSpeakersFromZone {
                zone_id,
                speaker_ids,
            } => {
                self.remove_speakers_from_zone(leader_api, &zone_id, &speaker_ids)
                    .await?
            }
            ForwardedCall::DeleteZone { zone_id } => self.delete_zone(leader_api, &zone_id).await?,
            ForwardedCall::ChangeZoneName {
                zone_id,
                display_name,
            } => {
                self.change_zone_name(leader_api, &zone_id, &display_name)
                    .await?
            }
            ForwardedCall::SetMute {
                speaker_id,
                is_muted,
            } => self.set_mute(leader_api, &speaker_id, is_muted).await?,
        }
        Ok(ForwardedReply::Done)
    }
}
