//! The 68-byte base handshake frame and its extension-protocol reserved bit.

use crate::error::Error;

use super::{InfoHash, PeerId};

pub const PROTOCOL: &[u8] = b"BitTorrent protocol";
pub const HANDSHAKE_LEN: usize = 1 + 19 + 8 + 20 + 20;

/// Bit 20 from the LSB of the 8 reserved bytes (byte 5, bit `0x10`) signals
/// BEP-10 extension protocol support.
const EXTENSION_RESERVED_BYTE: usize = 5;
const EXTENSION_RESERVED_BIT: u8 = 0x10;

#[derive(Debug, Clone)]
pub struct Handshake {
    pub reserved: [u8; 8],
    pub info_hash: InfoHash,
    pub peer_id: PeerId,
}

impl Handshake {
    pub fn new(info_hash: InfoHash, peer_id: PeerId, supports_extensions: bool) -> Self {
        let mut reserved = [0u8; 8];
        if supports_extensions {
            reserved[EXTENSION_RESERVED_BYTE] = EXTENSION_RESERVED_BIT;
        }
        Self {
            reserved,
            info_hash,
            peer_id,
        }
    }

    pub fn to_bytes(&self) -> [u8; HANDSHAKE_LEN] {
        let mut buf = [0u8; HANDSHAKE_LEN];
        buf[0] = 19;
        buf[1..20].copy_from_slice(PROTOCOL);
        buf[20..28].copy_from_slice(&self.reserved);
        buf[28..48].copy_from_slice(&self.info_hash);
        buf[48..68].copy_from_slice(&self.peer_id);
        buf
    }

    pub fn parse(buf: &[u8; HANDSHAKE_LEN]) -> Result<Self, Error> {
        if buf[0] != 19 {
            return Err(Error::HandshakeMismatch(format!(
                "expected pstrlen 19, got {}",
                buf[0]
            )));
        }
        if &buf[1..20] != PROTOCOL {
            return Err(Error::HandshakeMismatch(
                "pstr does not match \"BitTorrent protocol\"".into(),
            ));
        }
        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&buf[20..28]);
        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&buf[28..48]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&buf[48..68]);
        Ok(Self {
            reserved,
            info_hash,
            peer_id,
        })
    }

    pub fn supports_extensions(&self) -> bool {
        self.reserved[EXTENSION_RESERVED_BYTE] & EXTENSION_RESERVED_BIT != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_bytes() {
        let info_hash = [7u8; 20];
        let peer_id = [9u8; 20];
        let handshake = Handshake::new(info_hash, peer_id, true);
        let bytes = handshake.to_bytes();

        assert_eq!(bytes[0], 19);
        assert_eq!(&bytes[1..20], PROTOCOL);
        assert_eq!(&bytes[28..48], &info_hash[..]);
        assert_eq!(&bytes[48..68], &peer_id[..]);

        let parsed = Handshake::parse(&bytes).unwrap();
        assert_eq!(parsed.info_hash, info_hash);
        assert_eq!(parsed.peer_id, peer_id);
        assert!(parsed.supports_extensions());
    }

    #[test]
    fn extension_bit_is_off_by_default() {
        let handshake = Handshake::new([0; 20], [0; 20], false);
        assert!(!handshake.supports_extensions());
    }

    #[test]
    fn rejects_wrong_pstrlen() {
        let mut bytes = Handshake::new([0; 20], [0; 20], false).to_bytes();
        bytes[0] = 20;
        assert!(Handshake::parse(&bytes).is_err());
    }
}
