//! Hard mute through the speaker's audio transport.
//!
//! Muting bypasses the control API and talks RTSP to the session port the
//! speaker receives audio on, the same way a streaming source would.

use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{ApiError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

const MUTED_VOLUME: &str = "volume: -144.000000";
const FULL_VOLUME: &str = "volume: 0.000000";

/// Mute or unmute the speaker whose RTSP server listens on `addr`
pub async fn set_mute(addr: SocketAddr, muted: bool) -> Result<()> {
    let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| ApiError::Network(format!("connecting to {} timed out", addr)))?
        .map_err(|e| ApiError::Network(format!("Failed to connect to {}: {}", addr, e)))?;

    tokio::time::timeout(EXCHANGE_TIMEOUT, exchange(stream, muted))
        .await
        .map_err(|_| ApiError::Network(format!("mute request to {} timed out", addr)))?
}

async fn exchange(mut stream: TcpStream, muted: bool) -> Result<()> {
    let local = stream
        .local_addr()
        .map_err(|e| ApiError::Network(e.to_string()))?;
    let request = mute_request(local.ip(), muted);
    debug!(peer = ?stream.peer_addr().ok(), muted, "sending SET_PARAMETER");

    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| ApiError::Network(format!("Failed to send mute request: {}", e)))?;

    let mut reader = BufReader::new(stream);
    let mut status_line = String::new();
    reader
        .read_line(&mut status_line)
        .await
        .map_err(|e| ApiError::Network(format!("Failed to read mute reply: {}", e)))?;

    match parse_status(&status_line) {
        Some(200) => Ok(()),
        Some(code) => Err(ApiError::Transport(format!(
            "SET_PARAMETER returned status {}",
            code
        ))),
        None => Err(ApiError::Parse(format!(
            "unexpected RTSP status line: {:?}",
            status_line.trim_end()
        ))),
    }
}

fn mute_request(local_ip: std::net::IpAddr, muted: bool) -> String {
    let body = if muted { MUTED_VOLUME } else { FULL_VOLUME };
    let flag = if muted { "muted" } else { "unmuted" };

    format!(
        "SET_PARAMETER rtsp://{}/mute RTSP/1.0\r\n\
         CSeq: 1\r\n\
         Content-Type: text/parameters\r\n\
         X-BCG-Muted: {}\r\n\
         Content-Length: {}\r\n\
         \r\n\
         {}",
        local_ip,
        flag,
        body.len(),
        body
    )
}

/// Status code of an `RTSP/1.0 <code> <reason>` line
fn parse_status(line: &str) -> Option<u16> {
    let mut parts = line.split_whitespace();
    let protocol = parts.next()?;
    if !protocol.starts_with("RTSP/") {
        return None;
    }
    parts.next()?.parse().ok()
}
