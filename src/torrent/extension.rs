//! BEP-10 extension protocol: the handshake that negotiates per-extension
//! ids, and the `ut_metadata` sub-protocol used to fetch the info dictionary
//! for magnet links.

use std::collections::BTreeMap;

use crate::bencode::{self, BValue, Decoder};
use crate::error::Error;

/// Our own id for the metadata extension, advertised in our handshake's `m`
/// dictionary. Peers address metadata requests to this id, not to a
/// well-known constant -- BEP-10 ids are negotiated per connection.
pub const OUR_UT_METADATA_ID: u8 = 1;

const METADATA_MSG_TYPE_REQUEST: i64 = 0;
const METADATA_MSG_TYPE_DATA: i64 = 1;
const METADATA_MSG_TYPE_REJECT: i64 = 2;

/// Bencodes `{"m": {"ut_metadata": OUR_UT_METADATA_ID}}`.
pub fn build_handshake_payload() -> Vec<u8> {
    let mut m = BTreeMap::new();
    m.insert(b"ut_metadata".to_vec(), BValue::Int(OUR_UT_METADATA_ID as i64));
    let mut dict = BTreeMap::new();
    dict.insert(b"m".to_vec(), BValue::Dict(m));
    bencode::encode(&BValue::Dict(dict))
}

/// Extracts the peer's advertised id for `ut_metadata` from their handshake
/// payload, if they support it.
pub fn parse_handshake_payload(payload: &[u8]) -> Result<Option<u8>, Error> {
    let value = bencode::decode(payload)?;
    let m = match value.get("m") {
        Ok(m) => m,
        Err(_) => return Ok(None),
    };
    match m.get("ut_metadata") {
        Ok(id) => Ok(Some(id.as_int()? as u8)),
        Err(_) => Ok(None),
    }
}

/// Bencodes `{"msg_type": 0, "piece": piece_index}`.
pub fn build_metadata_request(piece_index: i64) -> Vec<u8> {
    let mut dict = BTreeMap::new();
    dict.insert(b"msg_type".to_vec(), BValue::Int(METADATA_MSG_TYPE_REQUEST));
    dict.insert(b"piece".to_vec(), BValue::Int(piece_index));
    bencode::encode(&BValue::Dict(dict))
}

/// A successful metadata response: the raw info-dictionary bytes (for
/// hashing) plus the decoded value (for field extraction).
pub struct MetadataPiece {
    pub info_bytes: Vec<u8>,
    pub info_value: BValue,
}

/// Parses a `ut_metadata` data message: a bencoded header dict immediately
/// followed by `total_size` raw bytes holding the info dictionary's
/// canonical bencoding.
pub fn parse_metadata_message(payload: &[u8]) -> Result<MetadataPiece, Error> {
    let mut decoder = Decoder::new(payload);
    let header = decoder.decode_value()?;
    let msg_type = header.get("msg_type")?.as_int()?;

    if msg_type == METADATA_MSG_TYPE_REJECT {
        return Err(Error::ExtensionUnsupported);
    }
    if msg_type != METADATA_MSG_TYPE_DATA {
        return Err(Error::ProtocolViolation(format!(
            "unexpected ut_metadata msg_type {msg_type}"
        )));
    }

    let total_size = header.get("total_size")?.as_int()? as usize;
    let info_bytes = payload[decoder.position()..].to_vec();
    if info_bytes.len() != total_size {
        return Err(Error::ProtocolViolation(format!(
            "metadata piece declared total_size {total_size} but carried {} bytes",
            info_bytes.len()
        )));
    }
    let info_value = bencode::decode(&info_bytes)?;

    Ok(MetadataPiece {
        info_bytes,
        info_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_handshake_payload() {
        let payload = build_handshake_payload();
        let id = parse_handshake_payload(&payload).unwrap();
        assert_eq!(id, Some(OUR_UT_METADATA_ID));
    }

    #[test]
    fn parses_metadata_data_message() {
        let info = b"d4:name1:xe".to_vec();
        let mut header = BTreeMap::new();
        header.insert(b"msg_type".to_vec(), BValue::Int(1));
        header.insert(b"piece".to_vec(), BValue::Int(0));
        header.insert(b"total_size".to_vec(), BValue::Int(info.len() as i64));
        let mut payload = bencode::encode(&BValue::Dict(header));
        payload.extend_from_slice(&info);

        let piece = parse_metadata_message(&payload).unwrap();
        assert_eq!(piece.info_bytes, info);
    }

    #[test]
    fn rejects_mismatched_total_size() {
        let info = b"d4:name1:xe".to_vec();
        let mut header = BTreeMap::new();
        header.insert(b"msg_type".to_vec(), BValue::Int(1));
        header.insert(b"piece".to_vec(), BValue::Int(0));
        header.insert(b"total_size".to_vec(), BValue::Int(999));
        let mut payload = bencode::encode(&BValue::Dict(header));
        payload.extend_from_slice(&info);

        assert!(parse_metadata_message(&payload).is_err());
    }

    #[test]
    fn treats_reject_as_extension_unsupported() {
        let mut header = BTreeMap::new();
        header.insert(b"msg_type".to_vec(), BValue::Int(2));
        header.insert(b"piece".to_vec(), BValue::Int(0));
        let payload = bencode::encode(&BValue::Dict(header));

        assert!(matches!(
            parse_metadata_message(&payload),
            Err(Error::ExtensionUnsupported)
        ));
    }
}
