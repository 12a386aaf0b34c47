//! Small stateless helpers shared by the tracker client and peer engine.

use rand::RngCore;

use crate::torrent::PeerId;

/// 20 random bytes from the OS RNG, generated fresh per connection. A
/// hard-coded ASCII peer id (seen in some reference implementations of this
/// protocol) would make every connection from this client indistinguishable
/// to a tracker or peer, which defeats the point of a peer id.
pub fn generate_peer_id() -> PeerId {
    let mut id = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut id);
    id
}

/// Percent-encodes raw bytes for use in a tracker query string. Unlike
/// `serde_urlencoded`, this operates on bytes that are not valid UTF-8 (the
/// info hash and peer id are arbitrary 20-byte blobs).
pub fn percent_encode_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for &b in bytes {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
