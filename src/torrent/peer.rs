//! A single peer connection: handshake, message framing, and the
//! choke/interest state machine. One connection is owned by exactly one
//! worker task; all reads and writes on it are sequential.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::error::Error;

use super::extension::{self, MetadataPiece};
use super::handshake::{Handshake, HANDSHAKE_LEN};
use super::message::Message;
use super::{InfoHash, PeerId};

/// A connected, handshaken peer.
pub struct PeerConnection {
    addr: SocketAddr,
    stream: TcpStream,
    pub peer_id: PeerId,
    pub supports_extensions: bool,
    pub bitfield: Option<Vec<u8>>,
    pub choked: bool,
    socket_timeout: Duration,
    /// A message read ahead of where the caller expected it (see
    /// [`PeerConnection::wait_for_bitfield`]), returned by the next
    /// `receive_message` call instead of hitting the socket again.
    pending: Option<Message>,
}

impl PeerConnection {
    /// Connects, performs the base handshake, and verifies the peer's
    /// handshake carries the same info hash we sent -- for a magnet link
    /// this is the `xt`-derived hash, since that's all that's known before
    /// the metadata exchange completes.
    pub async fn connect(
        addr: SocketAddr,
        info_hash: InfoHash,
        our_peer_id: PeerId,
        request_extensions: bool,
        socket_timeout: Duration,
    ) -> Result<Self, Error> {
        debug!(%addr, "connecting to peer");
        let mut stream = timeout(socket_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::NetworkFailure(std::io::Error::from(std::io::ErrorKind::TimedOut)))??;

        let our_handshake = Handshake::new(info_hash, our_peer_id, request_extensions);
        timeout(socket_timeout, stream.write_all(&our_handshake.to_bytes()))
            .await
            .map_err(|_| Error::NetworkFailure(std::io::Error::from(std::io::ErrorKind::TimedOut)))??;

        let mut reply = [0u8; HANDSHAKE_LEN];
        timeout(socket_timeout, stream.read_exact(&mut reply))
            .await
            .map_err(|_| Error::NetworkFailure(std::io::Error::from(std::io::ErrorKind::TimedOut)))??;
        let reply = Handshake::parse(&reply)?;

        if reply.info_hash != info_hash {
            return Err(Error::HandshakeMismatch(
                "peer's info hash does not match ours".into(),
            ));
        }

        debug!(%addr, peer_id = %hex::encode(reply.peer_id), "handshake complete");

        Ok(Self {
            addr,
            stream,
            peer_id: reply.peer_id,
            supports_extensions: reply.supports_extensions(),
            bitfield: None,
            choked: true,
            socket_timeout,
            pending: None,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn send_message(&mut self, message: &Message) -> Result<(), Error> {
        let bytes = message.to_bytes();
        timeout(self.socket_timeout, self.stream.write_all(&bytes))
            .await
            .map_err(|_| Error::NetworkFailure(std::io::Error::from(std::io::ErrorKind::TimedOut)))??;
        Ok(())
    }

    pub async fn receive_message(&mut self) -> Result<Message, Error> {
        if let Some(message) = self.pending.take() {
            return Ok(message);
        }

        let mut len_buf = [0u8; 4];
        timeout(self.socket_timeout, self.stream.read_exact(&mut len_buf))
            .await
            .map_err(|_| Error::NetworkFailure(std::io::Error::from(std::io::ErrorKind::TimedOut)))??;
        let len = u32::from_be_bytes(len_buf) as usize;

        if len == 0 {
            return Ok(Message::KeepAlive);
        }

        let mut body = vec![0u8; len];
        timeout(self.socket_timeout, self.stream.read_exact(&mut body))
            .await
            .map_err(|_| Error::NetworkFailure(std::io::Error::from(std::io::ErrorKind::TimedOut)))??;

        let message = Message::from_payload(&body)?;
        trace!(?message, "received message");
        Ok(message)
    }

    /// Waits for the peer's opening bitfield. Some peers, notably ones with
    /// no pieces at all, skip it and send `have`/`unchoke` directly; that is
    /// treated as an implicit empty bitfield rather than a protocol
    /// violation, and the message that tipped us off is stashed for the
    /// next `receive_message` call.
    pub async fn wait_for_bitfield(&mut self) -> Result<(), Error> {
        loop {
            match self.receive_message().await? {
                Message::Bitfield(bits) => {
                    self.bitfield = Some(bits);
                    return Ok(());
                }
                Message::KeepAlive => continue,
                Message::Have(index) => {
                    self.mark_have(index);
                    continue;
                }
                other => {
                    self.bitfield.get_or_insert_with(Vec::new);
                    self.pending = Some(other);
                    return Ok(());
                }
            }
        }
    }

    fn mark_have(&mut self, index: u32) {
        let bits = self.bitfield.get_or_insert_with(Vec::new);
        let byte_index = index as usize / 8;
        if byte_index >= bits.len() {
            bits.resize(byte_index + 1, 0);
        }
        bits[byte_index] |= 0x80 >> (index as usize % 8);
    }

    /// Whether the peer is known to have `index`. An unknown (zero-length)
    /// bitfield is treated as "unknown, assume present" since this client
    /// has no rarest-first policy to fall back on.
    pub fn has_piece(&self, index: u64) -> bool {
        match &self.bitfield {
            None => true,
            Some(bits) if bits.is_empty() => true,
            Some(bits) => {
                let byte_index = index as usize / 8;
                byte_index < bits.len() && bits[byte_index] & (0x80 >> (index as usize % 8)) != 0
            }
        }
    }

    /// Sends `interested` and waits to be unchoked.
    pub async fn wait_for_unchoke(&mut self) -> Result<(), Error> {
        self.send_message(&Message::Interested).await?;
        loop {
            match self.receive_message().await? {
                Message::Unchoke => {
                    self.choked = false;
                    return Ok(());
                }
                Message::Choke => {
                    self.choked = true;
                    continue;
                }
                Message::KeepAlive | Message::Have(_) | Message::Bitfield(_) => continue,
                other => {
                    trace!(?other, "ignoring unexpected message while awaiting unchoke");
                    continue;
                }
            }
        }
    }

    /// Performs the BEP-10 extension handshake and returns the peer's id
    /// for `ut_metadata`, if advertised.
    pub async fn perform_extension_handshake(&mut self) -> Result<u8, Error> {
        if !self.supports_extensions {
            return Err(Error::ExtensionUnsupported);
        }
        self.send_message(&Message::Extended {
            extension_id: 0,
            payload: extension::build_handshake_payload(),
        })
        .await?;

        loop {
            match self.receive_message().await? {
                Message::Extended { extension_id: 0, payload } => {
                    return extension::parse_handshake_payload(&payload)?
                        .ok_or(Error::ExtensionUnsupported);
                }
                Message::KeepAlive | Message::Have(_) | Message::Bitfield(_) => continue,
                other => {
                    trace!(?other, "ignoring unexpected message during extension handshake");
                    continue;
                }
            }
        }
    }

    /// Requests metadata piece 0 from the peer's `ut_metadata` extension id
    /// and returns the raw info-dictionary bytes once received.
    pub async fn request_metadata(&mut self, peer_metadata_id: u8) -> Result<MetadataPiece, Error> {
        self.send_message(&Message::Extended {
            extension_id: peer_metadata_id,
            payload: extension::build_metadata_request(0),
        })
        .await?;

        loop {
            match self.receive_message().await? {
                Message::Extended {
                    extension_id: extension::OUR_UT_METADATA_ID,
                    payload,
                } => return extension::parse_metadata_message(&payload),
                Message::KeepAlive | Message::Have(_) | Message::Bitfield(_) => continue,
                other => {
                    trace!(?other, "ignoring unexpected message during metadata exchange");
                    continue;
                }
            }
        }
    }
}
