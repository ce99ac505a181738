//! Cluster advertisement responder.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{DiscoveryError, Result};
use crate::ssdp::{parse_search_request, search_response, DISCOVERY_GROUP, DISCOVERY_PORT};
use crate::{detect_local_ip, ServiceEntry, SERVICE_TYPE};

/// Answers cluster searches on behalf of this node.
///
/// Only one advertiser can bind the discovery port per host. The answer
/// carries the host's outbound IPv4 address, re-detected for every search,
/// so a node that comes up before its network does starts answering with a
/// usable address as soon as one exists.
pub struct Advertiser {
    instance: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Advertiser {
    /// Start answering searches for `instance`, advertising `port`
    pub async fn start(instance: impl Into<String>, port: u16) -> Result<Self> {
        let instance = instance.into();
        if instance.is_empty() || instance.contains(|c: char| c == '\r' || c == '\n') {
            return Err(DiscoveryError::InvalidName(instance));
        }

        let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, DISCOVERY_PORT)))
            .await
            .map_err(|e| {
                DiscoveryError::NetworkError(format!(
                    "Failed to bind discovery port {}: {}",
                    DISCOVERY_PORT, e
                ))
            })?;
        socket
            .join_multicast_v4(DISCOVERY_GROUP, Ipv4Addr::UNSPECIFIED)
            .map_err(|e| {
                DiscoveryError::NetworkError(format!("Failed to join multicast group: {}", e))
            })?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(respond(socket, instance.clone(), port, shutdown_rx));

        info!(%instance, port, "advertising cluster");
        Ok(Self {
            instance,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// The advertised instance name
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Stop answering searches and wait for the responder to exit
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Advertiser {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn respond(
    socket: UdpSocket,
    instance: String,
    port: u16,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut buffer = [0u8; 2048];

    loop {
        let (size, src) = tokio::select! {
            _ = &mut shutdown_rx => break,
            received = socket.recv_from(&mut buffer) => match received {
                Ok(received) => received,
                Err(e) => {
                    warn!("Discovery socket error: {}", e);
                    continue;
                }
            },
        };

        let Ok(text) = std::str::from_utf8(&buffer[..size]) else {
            continue;
        };
        let Some(target) = parse_search_request(text) else {
            continue;
        };
        if target != SERVICE_TYPE && target != "ssdp:all" {
            continue;
        }

        let host = match detect_local_ip() {
            Some(IpAddr::V4(ip)) => Some(ip),
            _ => None,
        };
        let answer = search_response(&ServiceEntry {
            instance: instance.clone(),
            service_type: SERVICE_TYPE.to_string(),
            host,
            port,
        });

        debug!(%src, "answering cluster search");
        if let Err(e) = socket.send_to(answer.as_bytes(), src).await {
            warn!(%src, "Failed to answer cluster search: {}", e);
        }
    }

    debug!(%instance, "advertiser stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_names_that_break_framing() {
        let result = Advertiser::start("bad\r\nname", 7946).await;
        assert!(matches!(result, Err(DiscoveryError::InvalidName(_))));

        let result = Advertiser::start("", 7946).await;
        assert!(matches!(result, Err(DiscoveryError::InvalidName(_))));
    }
}
