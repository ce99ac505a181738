//! Commands sent to physical speakers

use async_trait::async_trait;
use speaker_api::{rtsp, SpeakerClient};
use tracing::debug;

use crate::error::Result;
use crate::model::Track;
use crate::resolve::SpeakerTarget;

/// The physical-node operations zone orchestration relies on.
///
/// Every call targets one already resolved speaker and either completes or
/// fails; there are no retries at this level.
#[async_trait]
pub trait SpeakerControl: Send + Sync {
    async fn change_service_name(&self, target: &SpeakerTarget, name: &str) -> Result<()>;

    async fn toggle_broadcast(&self, target: &SpeakerTarget, should_broadcast: bool) -> Result<()>;

    /// Add forward targets, by speaker id
    async fn forward_to(&self, target: &SpeakerTarget, ids: &[String]) -> Result<()>;

    /// Drop the given forward targets
    async fn remove_forward(&self, target: &SpeakerTarget, ids: &[String]) -> Result<()>;

    /// Drop every forward target
    async fn remove_all_forward(&self, target: &SpeakerTarget) -> Result<()>;

    async fn current_track(&self, target: &SpeakerTarget) -> Result<Track>;

    async fn is_muted(&self, target: &SpeakerTarget) -> Result<bool>;

    /// Hard mute through the audio transport, bypassing the control API
    async fn set_mute(&self, target: &SpeakerTarget, muted: bool) -> Result<()>;
}

/// [`SpeakerControl`] over the speaker HTTP API and RTSP
pub struct SpeakerApiControl {
    client: SpeakerClient,
}

impl SpeakerApiControl {
    pub fn new(client: SpeakerClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SpeakerControl for SpeakerApiControl {
    async fn change_service_name(&self, target: &SpeakerTarget, name: &str) -> Result<()> {
        debug!(speaker = %target.id, name, "changing service name");
        Ok(self.client.rename(target.api_addr, name).await?)
    }

    async fn toggle_broadcast(&self, target: &SpeakerTarget, should_broadcast: bool) -> Result<()> {
        debug!(speaker = %target.id, should_broadcast, "toggling broadcast");
        Ok(self
            .client
            .toggle_broadcast(target.api_addr, should_broadcast)
            .await?)
    }

    async fn forward_to(&self, target: &SpeakerTarget, ids: &[String]) -> Result<()> {
        debug!(speaker = %target.id, ?ids, "adding forward targets");
        Ok(self.client.forward_to(target.api_addr, ids.to_vec()).await?)
    }

    async fn remove_forward(&self, target: &SpeakerTarget, ids: &[String]) -> Result<()> {
        debug!(speaker = %target.id, ?ids, "removing forward targets");
        Ok(self.client.remove_forward(target.api_addr, ids.to_vec()).await?)
    }

    async fn remove_all_forward(&self, target: &SpeakerTarget) -> Result<()> {
        debug!(speaker = %target.id, "clearing forward targets");
        Ok(self.client.remove_all_forward(target.api_addr).await?)
    }

    async fn current_track(&self, target: &SpeakerTarget) -> Result<Track> {
        Ok(self.client.current_track(target.api_addr).await?.into())
    }

    async fn is_muted(&self, target: &SpeakerTarget) -> Result<bool> {
        Ok(self.client.is_muted(target.api_addr).await?)
    }

    async fn set_mute(&self, target: &SpeakerTarget, muted: bool) -> Result<()> {
        debug!(speaker = %target.id, muted, "setting hard mute");
        Ok(rtsp::set_mute(target.rtsp_addr, muted).await?)
    }
}
