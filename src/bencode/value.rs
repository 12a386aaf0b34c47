//! The bencode value model: a tagged variant over the four kinds the format
//! defines. Byte strings and dictionary keys are raw bytes -- not guaranteed
//! to be valid UTF-8 -- since `pieces` blobs and peer-supplied names flow
//! through the same type.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::Error;

/// A decoded bencode value.
///
/// Dictionaries are stored as a `BTreeMap` keyed by raw bytes, which gives us
/// canonical (lexicographic) key order for free on re-encode, regardless of
/// the order keys appeared in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BValue {
    Int(i64),
    Bytes(Vec<u8>),
    List(Vec<BValue>),
    Dict(BTreeMap<Vec<u8>, BValue>),
}

impl BValue {
    pub fn bytes(s: impl Into<Vec<u8>>) -> Self {
        BValue::Bytes(s.into())
    }

    pub fn as_int(&self) -> Result<i64, Error> {
        match self {
            BValue::Int(n) => Ok(*n),
            other => Err(Error::MetainfoSchema(format!(
                "expected integer, found {}",
                other.kind()
            ))),
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8], Error> {
        match self {
            BValue::Bytes(b) => Ok(b),
            other => Err(Error::MetainfoSchema(format!(
                "expected byte string, found {}",
                other.kind()
            ))),
        }
    }

    pub fn as_list(&self) -> Result<&[BValue], Error> {
        match self {
            BValue::List(l) => Ok(l),
            other => Err(Error::MetainfoSchema(format!(
                "expected list, found {}",
                other.kind()
            ))),
        }
    }

    pub fn as_dict(&self) -> Result<&BTreeMap<Vec<u8>, BValue>, Error> {
        match self {
            BValue::Dict(d) => Ok(d),
            other => Err(Error::MetainfoSchema(format!(
                "expected dictionary, found {}",
                other.kind()
            ))),
        }
    }

    /// Looks up a key in a dictionary value, failing with `MetainfoSchema`
    /// if `self` is not a dictionary or the key is absent.
    pub fn get(&self, key: &str) -> Result<&BValue, Error> {
        self.as_dict()?
            .get(key.as_bytes())
            .ok_or_else(|| Error::MetainfoSchema(format!("missing key \"{key}\"")))
    }

    fn kind(&self) -> &'static str {
        match self {
            BValue::Int(_) => "integer",
            BValue::Bytes(_) => "byte string",
            BValue::List(_) => "list",
            BValue::Dict(_) => "dictionary",
        }
    }
}

/// Renders a byte string as UTF-8 if possible, otherwise as lowercase hex.
/// Used only for human-facing output (the `decode` CLI subcommand and
/// `Display`); never for anything the codec round-trips.
fn render_bytes(b: &[u8]) -> String {
    match std::str::from_utf8(b) {
        Ok(s) if s.chars().all(|c| !c.is_control()) => s.to_string(),
        _ => hex::encode(b),
    }
}

impl fmt::Display for BValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BValue::Int(n) => write!(f, "{n}"),
            BValue::Bytes(b) => write!(f, "\"{}\"", render_bytes(b)),
            BValue::List(list) => {
                write!(f, "[")?;
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            BValue::Dict(dict) => {
                write!(f, "{{")?;
                for (i, (key, value)) in dict.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "\"{}\":{}", render_bytes(key), value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&BValue> for serde_json::Value {
    fn from(value: &BValue) -> Self {
        match value {
            BValue::Int(n) => serde_json::Value::Number((*n).into()),
            BValue::Bytes(b) => serde_json::Value::String(render_bytes(b)),
            BValue::List(list) => serde_json::Value::Array(list.iter().map(Into::into).collect()),
            BValue::Dict(dict) => serde_json::Value::Object(
                dict.iter()
                    .map(|(k, v)| (render_bytes(k), v.into()))
                    .collect(),
            ),
        }
    }
}

impl From<BValue> for serde_json::Value {
    fn from(value: BValue) -> Self {
        (&value).into()
    }
}
