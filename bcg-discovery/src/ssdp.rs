//! Wire format for cluster searches and advertisements.
//!
//! Searches and answers are SSDP-style text datagrams exchanged on a fixed
//! multicast group. Only the headers this crate needs are written or read.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::ServiceEntry;

/// Multicast group shared by searchers and advertisers
pub const DISCOVERY_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// UDP port advertisers listen on
pub const DISCOVERY_PORT: u16 = 1982;

pub(crate) fn discovery_addr() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(DISCOVERY_GROUP, DISCOVERY_PORT))
}

/// Build an M-SEARCH request for the given service type
pub(crate) fn search_request(service_type: &str) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {}:{}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: 1\r\n\
         ST: {}\r\n\
         USER-AGENT: bobcaygeon/0.2 UPnP/1.0\r\n\
         \r\n",
        DISCOVERY_GROUP, DISCOVERY_PORT, service_type
    )
}

/// Build the answer an advertiser sends back to a searcher
///
/// An entry without a host is written with an empty host so the searcher
/// sees an address-less advertisement.
pub(crate) fn search_response(entry: &ServiceEntry) -> String {
    let host = entry.host.map(|ip| ip.to_string()).unwrap_or_default();
    format!(
        "HTTP/1.1 200 OK\r\n\
         CACHE-CONTROL: max-age=30\r\n\
         ST: {}\r\n\
         USN: {}\r\n\
         LOCATION: {}:{}\r\n\
         \r\n",
        entry.service_type, entry.instance, host, entry.port
    )
}

/// Return the search target of an M-SEARCH request, if the text is one
pub(crate) fn parse_search_request(request: &str) -> Option<String> {
    let mut lines = request.lines();
    let start = lines.next()?.trim();
    if !start.starts_with("M-SEARCH") {
        return None;
    }

    lines.find_map(|line| extract_header_value(line.trim(), "ST:"))
}

/// Parse an advertiser's answer into a service entry
pub(crate) fn parse_search_response(response: &str) -> Option<ServiceEntry> {
    let mut service_type = None;
    let mut instance = None;
    let mut location = None;

    for line in response.lines() {
        let line = line.trim();

        if let Some(value) = extract_header_value(line, "ST:") {
            service_type = Some(value);
        } else if let Some(value) = extract_header_value(line, "USN:") {
            instance = Some(value);
        } else if let Some(value) = extract_header_value(line, "LOCATION:") {
            location = Some(value);
        }
    }

    let (host, port) = parse_location(&location?)?;
    match (service_type, instance) {
        (Some(service_type), Some(instance)) if !instance.is_empty() => Some(ServiceEntry {
            instance,
            service_type,
            host,
            port,
        }),
        _ => None,
    }
}

/// Split a `host:port` location; an empty or unparsable host yields `None`
fn parse_location(location: &str) -> Option<(Option<Ipv4Addr>, u16)> {
    let (host, port) = location.rsplit_once(':')?;
    let port = port.trim().parse::<u16>().ok()?;
    let host = host.trim().parse::<Ipv4Addr>().ok();
    Some((host, port))
}

/// Extract header value from a line like "HEADER: value"
fn extract_header_value(line: &str, header: &str) -> Option<String> {
    if line.len() > header.len() && line[..header.len()].eq_ignore_ascii_case(header) {
        Some(line[header.len()..].trim().to_string())
    } else {
        None
    }
}
