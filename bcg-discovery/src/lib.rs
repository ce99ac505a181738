//! Cluster discovery for bobcaygeon nodes
//!
//! A node that starts up searches the local network for an existing cluster
//! to join. Whichever node currently accepts joins advertises the cluster
//! under a fixed service type, answering SSDP-style multicast searches with
//! its name and gossip address.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use bcg_discovery::{search_for_cluster, Advertiser};
//!
//! # async fn run() -> bcg_discovery::Result<()> {
//! // Look for a cluster first
//! if let Some(entry) = search_for_cluster(Duration::from_secs(5)).await? {
//!     println!("found {} at {:?}", entry.instance, entry.addr());
//! }
//!
//! // Then advertise ourselves so later nodes can find us
//! let advertiser = Advertiser::start("brave-otter", 7946).await?;
//! advertiser.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod advertise;
mod error;
mod search;
mod ssdp;

pub use advertise::Advertiser;
pub use error::{DiscoveryError, Result};
pub use search::{search_for_cluster, wait_for_entry};
pub use ssdp::{DISCOVERY_GROUP, DISCOVERY_PORT};

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Service type every cluster advertisement is published under
pub const SERVICE_TYPE: &str = "_bobcaygeon._tcp";

/// A cluster advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    /// Name of the advertising node
    pub instance: String,
    /// Service type the advertisement was published under
    pub service_type: String,
    /// IPv4 address of the advertising node, if it reported one
    pub host: Option<Ipv4Addr>,
    /// Gossip port to join on
    pub port: u16,
}

impl ServiceEntry {
    /// The join target, if this advertisement carries a usable address
    pub fn addr(&self) -> Option<SocketAddr> {
        match self.host {
            Some(ip) if !ip.is_unspecified() => Some(SocketAddr::from((ip, self.port))),
            _ => None,
        }
    }
}

/// Detect the address this host uses for outbound traffic.
///
/// This routes a UDP socket towards a public address without sending
/// anything, then reads back the local end.
pub fn detect_local_ip() -> Option<IpAddr> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let local_addr = socket.local_addr().ok()?;
    Some(local_addr.ip())
}
