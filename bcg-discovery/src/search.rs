//! One-shot search for a cluster to join.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{DiscoveryError, Result};
use crate::ssdp::{discovery_addr, parse_search_response, search_request};
use crate::{ServiceEntry, SERVICE_TYPE};

/// How often the search request is repeated while waiting for answers
const RESEND_INTERVAL: Duration = Duration::from_millis(1000);

/// Search the local network for a cluster advertisement.
///
/// Returns the first advertisement that carries a usable address, or `None`
/// once `timeout` has elapsed. Later advertisements are ignored.
///
/// # Examples
///
/// ```no_run
/// # async fn run() -> bcg_discovery::Result<()> {
/// use std::time::Duration;
///
/// match bcg_discovery::search_for_cluster(Duration::from_secs(5)).await? {
///     Some(entry) => println!("joining {} at {:?}", entry.instance, entry.addr()),
///     None => println!("no cluster found, starting a new one"),
/// }
/// # Ok(())
/// # }
/// ```
pub async fn search_for_cluster(timeout: Duration) -> Result<Option<ServiceEntry>> {
    let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
        .await
        .map_err(|e| DiscoveryError::NetworkError(format!("Failed to bind UDP socket: {}", e)))?;
    socket
        .set_multicast_loop_v4(true)
        .map_err(|e| DiscoveryError::NetworkError(format!("Failed to set multicast loop: {}", e)))?;

    info!("searching for cluster to join");
    let (entries_tx, entries_rx) = mpsc::channel(16);
    let browser = tokio::spawn(browse(Arc::new(socket), entries_tx));

    let entry = wait_for_entry(entries_rx, timeout).await;
    browser.abort();

    match &entry {
        Some(found) => info!(instance = %found.instance, "found cluster to join"),
        None => info!("cluster search timeout, no cluster to join"),
    }
    Ok(entry)
}

/// Race an advertisement watcher against a deadline.
///
/// The watcher keeps consuming entries until one carries an address, since
/// an advertiser may answer before it knows its own address and send a
/// complete entry on a later round. Exactly one result is produced.
pub async fn wait_for_entry(
    mut entries: mpsc::Receiver<ServiceEntry>,
    timeout: Duration,
) -> Option<ServiceEntry> {
    let (found_tx, found_rx) = oneshot::channel();

    let watcher = tokio::spawn(async move {
        while let Some(entry) = entries.recv().await {
            if entry.addr().is_some() {
                let _ = found_tx.send(entry);
                return;
            }
            debug!(instance = %entry.instance, "advertisement has no address yet");
        }
    });

    let result = tokio::select! {
        found = found_rx => found.ok(),
        _ = tokio::time::sleep(timeout) => None,
    };

    watcher.abort();
    result
}

/// Send search requests and forward matching answers until the receiver goes away
async fn browse(socket: Arc<UdpSocket>, entries: mpsc::Sender<ServiceEntry>) {
    let request = search_request(SERVICE_TYPE);
    let mut resend = tokio::time::interval(RESEND_INTERVAL);
    let mut buffer = [0u8; 2048];

    loop {
        tokio::select! {
            _ = resend.tick() => {
                if let Err(e) = socket.send_to(request.as_bytes(), discovery_addr()).await {
                    warn!("Failed to send cluster search: {}", e);
                }
            }
            received = socket.recv_from(&mut buffer) => {
                let (size, src) = match received {
                    Ok(received) => received,
                    Err(e) => {
                        warn!("Socket error while searching: {}", e);
                        continue;
                    }
                };

                let Ok(text) = std::str::from_utf8(&buffer[..size]) else {
                    continue;
                };
                let Some(entry) = parse_search_response(text) else {
                    continue;
                };
                if entry.service_type != SERVICE_TYPE {
                    continue;
                }

                debug!(%src, instance = %entry.instance, "received cluster advertisement");
                if entries.send(entry).await.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(instance: &str, host: Option<Ipv4Addr>) -> ServiceEntry {
        ServiceEntry {
            instance: instance.to_string(),
            service_type: SERVICE_TYPE.to_string(),
            host,
            port: 7946,
        }
    }

    #[tokio::test]
    async fn test_waits_for_entry_with_address() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(entry("first", None)).await.unwrap();
        tx.send(entry("first", Some(Ipv4Addr::new(10, 0, 0, 2)))).await.unwrap();
        tx.send(entry("second", Some(Ipv4Addr::new(10, 0, 0, 3)))).await.unwrap();

        let found = wait_for_entry(rx, Duration::from_secs(5)).await.unwrap();
        assert_eq!(found.instance, "first");
        assert_eq!(found.addr(), Some("10.0.0.2:7946".parse().unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_without_usable_entry() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(entry("first", None)).await.unwrap();

        let found = wait_for_entry(rx, Duration::from_secs(5)).await;
        assert!(found.is_none());
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_with_no_entries() {
        let (_tx, rx) = mpsc::channel::<ServiceEntry>(4);
        assert!(wait_for_entry(rx, Duration::from_millis(200)).await.is_none());
    }
}
