//! Mapping node identities and consensus addresses to reachable endpoints

use bcg_cluster::{filter_by_role, Member, NodeRole};
use std::net::{IpAddr, SocketAddr};
use tracing::debug;

use crate::error::{MgmtError, Result};

/// Addresses of one live speaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakerTarget {
    pub id: String,
    /// Control API of the speaker
    pub api_addr: SocketAddr,
    /// Audio transport, used for hard mute
    pub rtsp_addr: SocketAddr,
}

/// Find the live music node named `id`.
///
/// No match is `NotFound`. Several live nodes claiming the same name is a
/// `Resolution` error, as there is no telling which one is meant.
pub fn find_speaker(members: &[Member], id: &str) -> Result<SpeakerTarget> {
    let matches: Vec<&Member> = members
        .iter()
        .filter(|m| m.name == id && m.has_role(NodeRole::Music))
        .collect();

    match matches.as_slice() {
        [] => Err(MgmtError::NotFound(format!("speaker {}", id))),
        [member] => {
            let meta = member.meta()?;
            Ok(SpeakerTarget {
                id: member.name.clone(),
                api_addr: SocketAddr::new(member.ip(), meta.api_port),
                rtsp_addr: SocketAddr::new(member.ip(), meta.rtsp_port),
            })
        }
        many => Err(MgmtError::Resolution(format!(
            "{} live nodes claim speaker id {}",
            many.len(),
            id
        ))),
    }
}

/// Map the consensus leader's `host:port` to its management API address.
///
/// A management member matches when it advertises the leader's consensus
/// port and lives on the leader's IP. A leader address without a usable
/// host (empty or unspecified) matches a member on a loopback address or on
/// one of `local_ips`.
pub fn resolve_leader_api_address(
    leader: &str,
    members: &[Member],
    local_ips: &[IpAddr],
) -> Result<SocketAddr> {
    let unresolved = || MgmtError::Resolution(format!("leader {} not found in membership", leader));

    let (host, port) = leader.rsplit_once(':').ok_or_else(unresolved)?;
    let port: u16 = port.parse().map_err(|_| unresolved())?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let leader_ip: Option<IpAddr> = match host {
        "" => None,
        host => match host.parse::<IpAddr>() {
            Ok(ip) if ip.is_unspecified() => None,
            Ok(ip) => Some(ip),
            Err(_) => return Err(unresolved()),
        },
    };

    for member in filter_by_role(members.to_vec(), NodeRole::Management) {
        let Ok(meta) = member.meta() else { continue };
        if meta.raft_port != port {
            continue;
        }

        let ip = member.ip();
        let same_host = match leader_ip {
            Some(leader_ip) => leader_ip == ip,
            None => ip.is_loopback() || local_ips.contains(&ip),
        };
        if same_host {
            let api = SocketAddr::new(ip, meta.api_port);
            debug!(leader, node = %member.name, %api, "resolved leader API address");
            return Ok(api);
        }
    }

    Err(unresolved())
}
