//! Parses a `.torrent` file into a [`Metainfo`] and computes its info-hash.
//!
//! The info dictionary is kept around verbatim (as a [`BValue`]) alongside
//! the structured fields so the info-hash can be derived by re-encoding it
//! canonically, with no separate "reconstruct the original bytes" path.

use sha1::{Digest, Sha1};

use crate::bencode::{self, BValue};
use crate::error::Error;

use super::InfoHash;

/// Single-file torrent metadata, as described by the `info` dictionary.
#[derive(Debug, Clone)]
pub struct Info {
    pub name: String,
    pub length: u64,
    pub piece_length: u64,
    pub pieces: Vec<u8>,
}

impl Info {
    fn from_bvalue(value: &BValue) -> Result<Self, Error> {
        let name = String::from_utf8(value.get("name")?.as_bytes()?.to_vec())
            .map_err(|_| Error::MetainfoSchema("info.name is not valid UTF-8".into()))?;
        let length = value.get("length")?.as_int()? as u64;
        let piece_length = value.get("piece length")?.as_int()? as u64;
        let pieces = value.get("pieces")?.as_bytes()?.to_vec();

        if length == 0 {
            return Err(Error::MetainfoSchema("info.length must be >= 1".into()));
        }
        if piece_length == 0 {
            return Err(Error::MetainfoSchema(
                "info.piece length must be >= 1".into(),
            ));
        }
        if pieces.len() % 20 != 0 {
            return Err(Error::MetainfoSchema(
                "info.pieces length is not a multiple of 20".into(),
            ));
        }

        let info = Self {
            name,
            length,
            piece_length,
            pieces,
        };

        let expected_pieces = info.total_pieces() as usize;
        if expected_pieces != info.pieces.len() / 20 {
            return Err(Error::MetainfoSchema(
                "piece count derived from length does not match pieces blob".into(),
            ));
        }

        Ok(info)
    }

    /// `ceil(length / piece_length)`.
    pub fn total_pieces(&self) -> u64 {
        (self.length + self.piece_length - 1) / self.piece_length
    }

    pub fn piece_hashes(&self) -> Vec<[u8; 20]> {
        self.pieces
            .chunks_exact(20)
            .map(|chunk| chunk.try_into().expect("chunks_exact(20) yields 20 bytes"))
            .collect()
    }

    /// Size of piece `index` in bytes; the last piece may be shorter than
    /// `piece_length`.
    pub fn piece_size(&self, index: u64) -> u64 {
        if index == self.total_pieces() - 1 {
            let remainder = self.length % self.piece_length;
            if remainder == 0 {
                self.piece_length
            } else {
                remainder
            }
        } else {
            self.piece_length
        }
    }

    /// Absolute byte offset of piece `index` within the file.
    pub fn piece_offset(&self, index: u64) -> u64 {
        index * self.piece_length
    }
}

/// A parsed `.torrent` file: tracker URL plus the info dictionary, in both
/// structured and raw (`BValue`) form.
#[derive(Debug, Clone)]
pub struct Metainfo {
    pub announce: String,
    pub info: Info,
    info_value: BValue,
}

impl Metainfo {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let value = bencode::decode(bytes)?;
        let announce = String::from_utf8(value.get("announce")?.as_bytes()?.to_vec())
            .map_err(|_| Error::MetainfoSchema("announce is not valid UTF-8".into()))?;
        let info_value = value.get("info")?.clone();
        let info = Info::from_bvalue(&info_value)?;

        Ok(Self {
            announce,
            info,
            info_value,
        })
    }

    /// SHA-1 of the canonical re-encoding of the `info` dictionary -- the
    /// torrent's identity on the wire and with the tracker.
    pub fn info_hash(&self) -> InfoHash {
        info_hash_of(&self.info_value)
    }
}

/// SHA-1 of a decoded info dictionary's canonical bencoding. Shared with the
/// magnet metadata-extension flow, which derives `Info` from a dictionary
/// that never passed through a `.torrent` file.
pub fn info_hash_of(info_value: &BValue) -> InfoHash {
    let encoded = bencode::encode(info_value);
    let mut hasher = Sha1::new();
    hasher.update(&encoded);
    hasher.finalize().into()
}

pub fn info_from_bvalue(value: &BValue) -> Result<Info, Error> {
    Info::from_bvalue(value)
}
