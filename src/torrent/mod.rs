//! The torrent engine: metainfo/info-hash, the peer wire protocol
//! (handshake, framing, BEP-10 extensions), the tracker client, and the
//! piece-download pipeline (per-piece pipelining, cross-peer scheduling,
//! and final assembly).

pub mod assembler;
pub mod download;
pub mod extension;
pub mod handshake;
pub mod magnet;
pub mod message;
pub mod metainfo;
pub mod peer;
pub mod scheduler;
pub mod tracker;

#[cfg(test)]
mod tests;

/// SHA-1 over the canonical bencoding of an `info` dictionary; the
/// torrent's identity on the wire and with the tracker.
pub type InfoHash = [u8; 20];

/// 20 bytes a client presents to identify itself to peers and trackers.
pub type PeerId = [u8; 20];

/// One unit of the scheduler's work queue: a piece index plus everything
/// needed to fetch and verify it without consulting the `Metainfo` again.
#[derive(Debug, Clone)]
pub struct PieceWork {
    pub index: u64,
    pub length: u64,
    pub offset: u64,
    pub hash: [u8; 20],
}

impl PieceWork {
    /// Builds the full work list for a torrent's `Info`, in index order.
    pub fn plan(info: &metainfo::Info) -> Vec<Self> {
        info.piece_hashes()
            .into_iter()
            .enumerate()
            .map(|(index, hash)| {
                let index = index as u64;
                Self {
                    index,
                    length: info.piece_size(index),
                    offset: info.piece_offset(index),
                    hash,
                }
            })
            .collect()
    }
}
