//! Streaming bencode decoder.
//!
//! Operates on a byte buffer with a cursor, decoding exactly one value and
//! leaving the cursor positioned just past it -- this is what lets the
//! extension protocol's metadata message (a bencoded dict immediately
//! followed by raw payload bytes) be decoded without a length hint.

use std::collections::BTreeMap;

use crate::error::Error;

use super::value::BValue;

pub struct Decoder<'a> {
    input: &'a [u8],
    position: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, position: 0 }
    }

    /// Decodes a single value, leaving the cursor just past it.
    pub fn decode_value(&mut self) -> Result<BValue, Error> {
        match self.peek()? {
            b'i' => self.decode_integer(),
            b'l' => self.decode_list(),
            b'd' => self.decode_dict(),
            c if c.is_ascii_digit() => self.decode_string().map(BValue::Bytes),
            c => Err(self.err(format!("unsupported format byte 0x{c:02x}"))),
        }
    }

    /// Decodes exactly one value and confirms no trailing bytes remain.
    pub fn decode_complete(&mut self) -> Result<BValue, Error> {
        let value = self.decode_value()?;
        if self.position != self.input.len() {
            return Err(self.err("trailing bytes after bencode value".to_string()));
        }
        Ok(value)
    }

    /// Current byte offset into the input -- used by the extension protocol
    /// to find where a bencoded prefix ends and a raw payload begins.
    pub fn position(&self) -> usize {
        self.position
    }

    fn peek(&self) -> Result<u8, Error> {
        self.input
            .get(self.position)
            .copied()
            .ok_or_else(|| self.err("unexpected end of input".to_string()))
    }

    fn err(&self, message: String) -> Error {
        Error::MalformedBencode {
            position: self.position,
            message,
        }
    }

    fn decode_integer(&mut self) -> Result<BValue, Error> {
        self.position += 1; // consume 'i'
        let start = self.position;
        while self.peek()? != b'e' {
            self.position += 1;
        }
        let digits = &self.input[start..self.position];
        self.position += 1; // consume 'e'
        let text = std::str::from_utf8(digits)
            .map_err(|_| self.err("integer is not valid UTF-8".to_string()))?;
        let n: i64 = text
            .parse()
            .map_err(|_| self.err(format!("invalid integer literal \"{text}\"")))?;
        Ok(BValue::Int(n))
    }

    fn decode_string(&mut self) -> Result<Vec<u8>, Error> {
        let start = self.position;
        while self.peek()? != b':' {
            if !self.input[self.position].is_ascii_digit() {
                return Err(self.err("expected ':' after string length".to_string()));
            }
            self.position += 1;
        }
        let len_str = std::str::from_utf8(&self.input[start..self.position]).unwrap();
        let len: usize = len_str
            .parse()
            .map_err(|_| self.err(format!("invalid string length \"{len_str}\"")))?;
        self.position += 1; // consume ':'

        let end = self
            .position
            .checked_add(len)
            .filter(|&e| e <= self.input.len())
            .ok_or_else(|| {
                self.err(format!(
                    "string of length {len} exceeds remaining input"
                ))
            })?;
        let bytes = self.input[self.position..end].to_vec();
        self.position = end;
        Ok(bytes)
    }

    fn decode_list(&mut self) -> Result<BValue, Error> {
        self.position += 1; // consume 'l'
        let mut items = Vec::new();
        loop {
            if self.peek()? == b'e' {
                self.position += 1;
                return Ok(BValue::List(items));
            }
            items.push(self.decode_value()?);
        }
    }

    fn decode_dict(&mut self) -> Result<BValue, Error> {
        self.position += 1; // consume 'd'
        let mut map = BTreeMap::new();
        loop {
            if self.peek()? == b'e' {
                self.position += 1;
                return Ok(BValue::Dict(map));
            }
            let key = self.decode_string()?;
            let value = self.decode_value()?;
            map.insert(key, value);
        }
    }
}

/// Decodes a complete bencode value from a byte buffer, failing if any
/// trailing bytes remain.
pub fn decode(input: &[u8]) -> Result<BValue, Error> {
    Decoder::new(input).decode_complete()
}
