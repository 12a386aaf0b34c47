//! Peer wire messages: `[4-byte length][1-byte id][body]`, with a zero
//! length meaning keep-alive.

use crate::error::Error;

const ID_CHOKE: u8 = 0;
const ID_UNCHOKE: u8 = 1;
const ID_INTERESTED: u8 = 2;
const ID_NOT_INTERESTED: u8 = 3;
const ID_HAVE: u8 = 4;
const ID_BITFIELD: u8 = 5;
const ID_REQUEST: u8 = 6;
const ID_PIECE: u8 = 7;
const ID_CANCEL: u8 = 8;
const ID_EXTENDED: u8 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have(u32),
    Bitfield(Vec<u8>),
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, block: Vec<u8> },
    Cancel { index: u32, begin: u32, length: u32 },
    Extended { extension_id: u8, payload: Vec<u8> },
}

impl Message {
    /// Serializes to the on-wire frame, including the 4-byte length prefix.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::new();
        match self {
            Message::KeepAlive => return 0u32.to_be_bytes().to_vec(),
            Message::Choke => body.push(ID_CHOKE),
            Message::Unchoke => body.push(ID_UNCHOKE),
            Message::Interested => body.push(ID_INTERESTED),
            Message::NotInterested => body.push(ID_NOT_INTERESTED),
            Message::Have(index) => {
                body.push(ID_HAVE);
                body.extend_from_slice(&index.to_be_bytes());
            }
            Message::Bitfield(bits) => {
                body.push(ID_BITFIELD);
                body.extend_from_slice(bits);
            }
            Message::Request { index, begin, length } => {
                body.push(ID_REQUEST);
                body.extend_from_slice(&index.to_be_bytes());
                body.extend_from_slice(&begin.to_be_bytes());
                body.extend_from_slice(&length.to_be_bytes());
            }
            Message::Piece { index, begin, block } => {
                body.push(ID_PIECE);
                body.extend_from_slice(&index.to_be_bytes());
                body.extend_from_slice(&begin.to_be_bytes());
                body.extend_from_slice(block);
            }
            Message::Cancel { index, begin, length } => {
                body.push(ID_CANCEL);
                body.extend_from_slice(&index.to_be_bytes());
                body.extend_from_slice(&begin.to_be_bytes());
                body.extend_from_slice(&length.to_be_bytes());
            }
            Message::Extended { extension_id, payload } => {
                body.push(ID_EXTENDED);
                body.push(*extension_id);
                body.extend_from_slice(payload);
            }
        }
        let mut framed = Vec::with_capacity(4 + body.len());
        framed.extend_from_slice(&(body.len() as u32).to_be_bytes());
        framed.extend_from_slice(&body);
        framed
    }

    /// Parses the payload that follows the length prefix (i.e. `bytes` does
    /// NOT include the 4-byte length). An empty slice is a keep-alive.
    pub fn from_payload(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.is_empty() {
            return Ok(Message::KeepAlive);
        }
        let id = bytes[0];
        let body = &bytes[1..];
        match id {
            ID_CHOKE => Ok(Message::Choke),
            ID_UNCHOKE => Ok(Message::Unchoke),
            ID_INTERESTED => Ok(Message::Interested),
            ID_NOT_INTERESTED => Ok(Message::NotInterested),
            ID_HAVE => {
                let index = read_u32(body, "have")?;
                Ok(Message::Have(index))
            }
            ID_BITFIELD => Ok(Message::Bitfield(body.to_vec())),
            ID_REQUEST => {
                require_len(body, 12, "request")?;
                Ok(Message::Request {
                    index: u32::from_be_bytes(body[0..4].try_into().unwrap()),
                    begin: u32::from_be_bytes(body[4..8].try_into().unwrap()),
                    length: u32::from_be_bytes(body[8..12].try_into().unwrap()),
                })
            }
            ID_PIECE => {
                if body.len() < 8 {
                    return Err(Error::ProtocolViolation(
                        "piece message shorter than header".into(),
                    ));
                }
                Ok(Message::Piece {
                    index: u32::from_be_bytes(body[0..4].try_into().unwrap()),
                    begin: u32::from_be_bytes(body[4..8].try_into().unwrap()),
                    block: body[8..].to_vec(),
                })
            }
            ID_CANCEL => {
                require_len(body, 12, "cancel")?;
                Ok(Message::Cancel {
                    index: u32::from_be_bytes(body[0..4].try_into().unwrap()),
                    begin: u32::from_be_bytes(body[4..8].try_into().unwrap()),
                    length: u32::from_be_bytes(body[8..12].try_into().unwrap()),
                })
            }
            ID_EXTENDED => {
                if body.is_empty() {
                    return Err(Error::ProtocolViolation(
                        "extended message missing extension id".into(),
                    ));
                }
                Ok(Message::Extended {
                    extension_id: body[0],
                    payload: body[1..].to_vec(),
                })
            }
            other => Err(Error::ProtocolViolation(format!(
                "unknown message id {other}"
            ))),
        }
    }
}

fn read_u32(body: &[u8], what: &str) -> Result<u32, Error> {
    require_len(body, 4, what)?;
    Ok(u32::from_be_bytes(body[0..4].try_into().unwrap()))
}

fn require_len(body: &[u8], expected: usize, what: &str) -> Result<(), Error> {
    if body.len() < expected {
        return Err(Error::ProtocolViolation(format!(
            "{what} message body shorter than expected: {} < {expected}",
            body.len()
        )));
    }
    Ok(())
}
