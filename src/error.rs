//! The error taxonomy shared by every layer of the client.
//!
//! Each variant corresponds to one of the kinds from the design spec's error
//! handling section, not to a particular module's internal representation --
//! callers match on kind, not on where in the pipeline the failure occurred.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed bencode at byte {position}: {message}")]
    MalformedBencode { position: usize, message: String },

    #[error("metainfo schema violation: {0}")]
    MetainfoSchema(String),

    #[error("tracker request failed: {0}")]
    TrackerFailure(String),

    #[error("network I/O failed: {0}")]
    NetworkFailure(#[from] std::io::Error),

    #[error("handshake mismatch: {0}")]
    HandshakeMismatch(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("piece {index} failed verification")]
    PieceVerificationFailed { index: usize },

    #[error("piece {index} unrecoverable after exhausting all peers")]
    PieceUnrecoverable { index: usize },

    #[error("download incomplete: {missing} of {total} pieces missing")]
    IncompleteDownload { missing: usize, total: usize },

    #[error("peer does not support the extension protocol")]
    ExtensionUnsupported,
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::TrackerFailure(err.to_string())
    }
}
