//! HTTP tracker client: issues the announce GET and parses the compact peer
//! list out of the bencoded response.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

use serde::Serialize;
use tracing::{debug, info};

use crate::bencode;
use crate::error::Error;
use crate::utils::percent_encode_bytes;

use super::{InfoHash, PeerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerAddr(pub SocketAddrV4);

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.0.ip(), self.0.port())
    }
}

/// The parts of the announce query that are plain scalars; `info_hash` and
/// `peer_id` are raw byte strings and are appended to the URL separately
/// since they are not guaranteed to be valid UTF-8.
#[derive(Debug, Serialize)]
struct AnnounceQuery {
    port: u16,
    uploaded: u64,
    downloaded: u64,
    left: u64,
    compact: u8,
}

pub async fn get_peers(
    announce_url: &str,
    info_hash: InfoHash,
    peer_id: PeerId,
    left: u64,
    port: u16,
) -> Result<Vec<PeerAddr>, Error> {
    let query = AnnounceQuery {
        port,
        uploaded: 0,
        downloaded: 0,
        left,
        compact: 1,
    };
    let scalar_params = serde_urlencoded::to_string(&query)
        .map_err(|e| Error::TrackerFailure(format!("failed to encode query: {e}")))?;

    let separator = if announce_url.contains('?') { "&" } else { "?" };
    let url = format!(
        "{announce_url}{separator}{scalar_params}&info_hash={}&peer_id={}",
        percent_encode_bytes(&info_hash),
        percent_encode_bytes(&peer_id),
    );

    info!(url = %announce_url, "announcing to tracker");
    let client = reqwest::Client::new();
    let response = client.get(url).send().await?;
    let status = response.status();
    let body = response.bytes().await?;

    if !status.is_success() {
        return Err(Error::TrackerFailure(format!(
            "tracker returned HTTP {status}"
        )));
    }

    let decoded = bencode::decode(&body)?;
    if let Ok(failure) = decoded.get("failure reason") {
        let message = String::from_utf8_lossy(failure.as_bytes()?).into_owned();
        return Err(Error::TrackerFailure(message));
    }

    let peers_bytes = decoded.get("peers")?.as_bytes()?;
    if peers_bytes.len() % 6 != 0 {
        return Err(Error::TrackerFailure(
            "peers field is not a multiple of 6 bytes".into(),
        ));
    }

    let peers = peers_bytes
        .chunks_exact(6)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            PeerAddr(SocketAddrV4::new(ip, port))
        })
        .collect::<Vec<_>>();

    debug!(count = peers.len(), "tracker returned peers");
    Ok(peers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compact_peer_list() {
        let raw: [u8; 12] = [0x0A, 0x00, 0x00, 0x01, 0x1A, 0xE1, 0xC0, 0xA8, 0x01, 0x02, 0x68, 0xE0];
        let peers = raw
            .chunks_exact(6)
            .map(|chunk| {
                let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
                let port = u16::from_be_bytes([chunk[4], chunk[5]]);
                PeerAddr(SocketAddrV4::new(ip, port)).to_string()
            })
            .collect::<Vec<_>>();
        assert_eq!(peers, vec!["10.0.0.1:6881", "192.168.1.2:26848"]);
    }
}
