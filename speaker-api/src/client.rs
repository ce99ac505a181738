use std::net::SocketAddr;
use std::time::Duration;
use tracing::debug;

use crate::error::{ApiError, Result};
use crate::operation::{EmptyRequest, SpeakerOperation};
use crate::operations::{
    ChangeServiceNameOperation, ChangeServiceNameRequest, ForwardToNodesOperation,
    ForwardToNodesRequest, GetCurrentTrackOperation, GetMutedOperation,
    RemoveForwardToNodesOperation, RemoveForwardToNodesRequest, ToggleBroadcastOperation,
    ToggleBroadcastRequest, TrackResponse,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the control endpoint every speaker exposes.
///
/// Connections are not kept between calls: each operation dials the speaker,
/// sends one request and closes the connection when the reply is read.
///
/// # Example
///
/// ```no_run
/// use speaker_api::SpeakerClient;
///
/// # async fn run() -> speaker_api::Result<()> {
/// let client = SpeakerClient::new()?;
/// let speaker = "192.168.1.40:7070".parse().unwrap();
///
/// client.toggle_broadcast(speaker, false).await?;
/// let track = client.current_track(speaker).await?;
/// println!("{} - {}", track.artist, track.title);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SpeakerClient {
    http: reqwest::Client,
}

impl SpeakerClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    /// Execute an operation against the speaker whose control API listens on `addr`
    pub async fn execute<Op: SpeakerOperation>(
        &self,
        addr: SocketAddr,
        request: &Op::Request,
    ) -> Result<Op::Response> {
        let url = format!("http://{}/api/{}", addr, Op::ACTION);
        debug!(%addr, action = Op::ACTION, "calling speaker");

        let response = self.http.post(&url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Network(format!(
                "{} failed: HTTP {}",
                Op::ACTION,
                status
            )));
        }

        let body: serde_json::Value = response.json().await?;
        Op::parse_response(body)
    }

    pub async fn rename(&self, addr: SocketAddr, new_name: &str) -> Result<()> {
        let request = ChangeServiceNameRequest {
            new_name: new_name.to_string(),
        };
        self.execute::<ChangeServiceNameOperation>(addr, &request).await
    }

    pub async fn toggle_broadcast(&self, addr: SocketAddr, should_broadcast: bool) -> Result<()> {
        let request = ToggleBroadcastRequest { should_broadcast };
        self.execute::<ToggleBroadcastOperation>(addr, &request).await
    }

    pub async fn forward_to(&self, addr: SocketAddr, ids: Vec<String>) -> Result<()> {
        let request = ForwardToNodesRequest { ids };
        self.execute::<ForwardToNodesOperation>(addr, &request).await
    }

    pub async fn remove_forward(&self, addr: SocketAddr, ids: Vec<String>) -> Result<()> {
        let request = RemoveForwardToNodesRequest::ids(ids);
        self.execute::<RemoveForwardToNodesOperation>(addr, &request).await
    }

    pub async fn remove_all_forward(&self, addr: SocketAddr) -> Result<()> {
        let request = RemoveForwardToNodesRequest::all();
        self.execute::<RemoveForwardToNodesOperation>(addr, &request).await
    }

    pub async fn current_track(&self, addr: SocketAddr) -> Result<TrackResponse> {
        self.execute::<GetCurrentTrackOperation>(addr, &EmptyRequest {})
            .await
    }

    pub async fn is_muted(&self, addr: SocketAddr) -> Result<bool> {
        let response = self
            .execute::<GetMutedOperation>(addr, &EmptyRequest {})
            .await?;
        Ok(response.is_muted)
    }
}
