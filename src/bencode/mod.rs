//! Bencode codec: the wire format shared by torrent files, tracker
//! responses, and extension-protocol payloads.

mod decoder;
mod encoder;
mod value;

pub use decoder::{decode, Decoder};
pub use encoder::encode;
pub use value::BValue;
