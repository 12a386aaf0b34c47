//! Parses `magnet:?xt=urn:btih:<hash>&dn=<name>&tr=<tracker>` URIs.
//!
//! No `.torrent` file is involved; the info dictionary (and therefore piece
//! layout) is unknown until the metadata extension exchange completes.

use std::fmt;

use crate::error::Error;

use super::InfoHash;

#[derive(Debug, Clone)]
pub struct MagnetLink {
    pub info_hash: InfoHash,
    pub name: Option<String>,
    pub tracker: Option<String>,
}

impl MagnetLink {
    pub fn parse(uri: &str) -> Result<Self, Error> {
        let query = uri
            .strip_prefix("magnet:?")
            .ok_or_else(|| Error::MetainfoSchema("not a magnet URI".into()))?;

        let mut info_hash = None;
        let mut name = None;
        let mut tracker = None;

        for pair in query.split('&') {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next().unwrap_or_default();
            let value = parts.next().unwrap_or_default();

            match key {
                "xt" => {
                    let hex_hash = value.strip_prefix("urn:btih:").ok_or_else(|| {
                        Error::MetainfoSchema("xt must begin with urn:btih:".into())
                    })?;
                    info_hash = Some(parse_hex_info_hash(hex_hash)?);
                }
                "dn" => name = Some(percent_decode(value)?),
                "tr" => tracker = Some(percent_decode(value)?),
                _ => {}
            }
        }

        let info_hash =
            info_hash.ok_or_else(|| Error::MetainfoSchema("magnet link missing xt".into()))?;

        Ok(Self {
            info_hash,
            name,
            tracker,
        })
    }
}

fn parse_hex_info_hash(hex_hash: &str) -> Result<InfoHash, Error> {
    if hex_hash.len() != 40 {
        return Err(Error::MetainfoSchema(format!(
            "expected 40 hex characters in info hash, got {}",
            hex_hash.len()
        )));
    }
    let bytes = hex::decode(hex_hash)
        .map_err(|e| Error::MetainfoSchema(format!("invalid hex info hash: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| Error::MetainfoSchema("info hash is not 20 bytes".into()))
}

fn percent_decode(input: &str) -> Result<String, Error> {
    let mut out = Vec::with_capacity(input.len());
    let mut chars = input.bytes();
    while let Some(b) = chars.next() {
        match b {
            b'%' => {
                let hi = chars
                    .next()
                    .ok_or_else(|| Error::MetainfoSchema("truncated percent escape".into()))?;
                let lo = chars
                    .next()
                    .ok_or_else(|| Error::MetainfoSchema("truncated percent escape".into()))?;
                let byte = u8::from_str_radix(&format!("{}{}", hi as char, lo as char), 16)
                    .map_err(|_| Error::MetainfoSchema("invalid percent escape".into()))?;
                out.push(byte);
            }
            b'+' => out.push(b' '),
            other => out.push(other),
        }
    }
    String::from_utf8(out).map_err(|_| Error::MetainfoSchema("magnet field is not UTF-8".into()))
}

impl fmt::Display for MagnetLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tracker) = &self.tracker {
            writeln!(f, "Tracker URL: {tracker}")?;
        }
        write!(f, "Info Hash: {}", hex::encode(self.info_hash))
    }
}
