//! End-to-end tests exercising the peer protocol, the extension sub-protocol,
//! and the piece-download pipeline against in-process mock peers over
//! loopback TCP. No real swarm, no real tracker -- these are the two
//! properties spec'd as "concrete scenarios": a multi-peer piece download
//! and a magnet metadata exchange.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::bencode::{self, BValue};
use crate::config::ClientConfig;

use super::extension;
use super::handshake::{Handshake, HANDSHAKE_LEN};
use super::message::Message;
use super::peer::PeerConnection;
use super::tracker::PeerAddr;
use super::{assembler, metainfo, scheduler, InfoHash, PeerId, PieceWork};

async fn read_message(stream: &mut TcpStream) -> Option<Message> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.ok()?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Some(Message::KeepAlive);
    }
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await.ok()?;
    Message::from_payload(&body).ok()
}

fn piece_layout(piece_length: usize, file_len: usize) -> Vec<(usize, usize)> {
    let mut offsets = Vec::new();
    let mut start = 0;
    while start < file_len {
        let len = piece_length.min(file_len - start);
        offsets.push((start, len));
        start += len;
    }
    offsets
}

/// A mock peer that performs a real base handshake, sends a full bitfield,
/// unchokes on `interested`, and serves any `request` out of `file` -- good
/// enough to stand in for a real peer across the pipelining/verification
/// code path without a real swarm.
struct MockPeer {
    listener: TcpListener,
}

impl MockPeer {
    async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self { listener }
    }

    fn addr(&self) -> SocketAddr {
        self.listener.local_addr().unwrap()
    }

    fn peer_addr(&self) -> PeerAddr {
        match self.addr() {
            SocketAddr::V4(v4) => PeerAddr(v4),
            SocketAddr::V6(_) => unreachable!("loopback bind is always IPv4 here"),
        }
    }

    /// Completes handshake, bitfield, and unchoke normally, but never answers
    /// a `request` -- drives the worker's `socket_timeout` path so a piece
    /// can be observed bouncing off one peer and landing on another.
    fn stall_on_requests(self, info_hash: InfoHash) {
        tokio::spawn(async move {
            let (mut stream, _) = self.listener.accept().await.unwrap();
            let mut buf = [0u8; HANDSHAKE_LEN];
            stream.read_exact(&mut buf).await.unwrap();
            let reply = Handshake::new(info_hash, [3u8; 20], false);
            stream.write_all(&reply.to_bytes()).await.unwrap();
            stream
                .write_all(&Message::Bitfield(vec![0xFF]).to_bytes())
                .await
                .unwrap();

            loop {
                match read_message(&mut stream).await {
                    Some(Message::Interested) => {
                        stream.write_all(&Message::Unchoke.to_bytes()).await.unwrap();
                    }
                    Some(Message::Request { .. }) => {
                        // Silently drop it; the client's socket_timeout does the rest.
                    }
                    Some(_) => continue,
                    None => break,
                }
            }
        });
    }

    fn serve_pieces(self, info_hash: InfoHash, piece_length: usize, file: Vec<u8>) {
        tokio::spawn(async move {
            let (mut stream, _) = self.listener.accept().await.unwrap();

            let mut buf = [0u8; HANDSHAKE_LEN];
            stream.read_exact(&mut buf).await.unwrap();
            let their_handshake = Handshake::parse(&buf).unwrap();
            assert_eq!(their_handshake.info_hash, info_hash);

            let reply = Handshake::new(info_hash, [9u8; 20], false);
            stream.write_all(&reply.to_bytes()).await.unwrap();

            stream
                .write_all(&Message::Bitfield(vec![0xFF]).to_bytes())
                .await
                .unwrap();

            let layout = piece_layout(piece_length, file.len());
            loop {
                match read_message(&mut stream).await {
                    Some(Message::Interested) => {
                        stream.write_all(&Message::Unchoke.to_bytes()).await.unwrap();
                    }
                    Some(Message::Request { index, begin, length }) => {
                        let (piece_start, _) = layout[index as usize];
                        let start = piece_start + begin as usize;
                        let block = file[start..start + length as usize].to_vec();
                        stream
                            .write_all(&Message::Piece { index, begin, block }.to_bytes())
                            .await
                            .unwrap();
                    }
                    Some(_) => continue,
                    None => break,
                }
            }
        });
    }
}

/// Scenario: a 3-piece torrent (two 32768-byte pieces, one 12345-byte last
/// piece) downloaded across two cooperating mock peers produces a file of
/// exactly the right length with every piece's SHA-1 matching.
#[tokio::test]
async fn end_to_end_download_across_two_mock_peers() {
    let piece_length: usize = 32768;
    let total_len = 2 * piece_length + 12345;
    let file: Vec<u8> = (0..total_len).map(|i| (i % 251) as u8).collect();
    let layout = piece_layout(piece_length, total_len);

    let pieces: Vec<PieceWork> = layout
        .iter()
        .enumerate()
        .map(|(index, &(start, len))| {
            let mut hasher = Sha1::new();
            hasher.update(&file[start..start + len]);
            PieceWork {
                index: index as u64,
                length: len as u64,
                offset: start as u64,
                hash: hasher.finalize().into(),
            }
        })
        .collect();
    assert_eq!(pieces.len(), 3);

    let info_hash: InfoHash = [0x42; 20];
    let our_peer_id: PeerId = [0x01; 20];

    let mock_a = MockPeer::bind().await;
    let addr_a = mock_a.peer_addr();
    let mock_b = MockPeer::bind().await;
    let addr_b = mock_b.peer_addr();
    mock_a.serve_pieces(info_hash, piece_length, file.clone());
    mock_b.serve_pieces(info_hash, piece_length, file.clone());

    let mut config = ClientConfig::default();
    config.max_workers = 2;

    let completed = scheduler::run(vec![addr_a, addr_b], pieces, info_hash, our_peer_id, config)
        .await
        .unwrap();

    let assembled = assembler::assemble(total_len as u64, 3, completed).unwrap();
    assert_eq!(assembled, file);
}

/// Scenario: metadata exchange against a mock peer advertising
/// `ut_metadata=3` yields info bytes whose SHA-1 equals the magnet's
/// embedded info-hash.
#[tokio::test]
async fn magnet_metadata_exchange_matches_info_hash() {
    let mut info_dict = BTreeMap::new();
    info_dict.insert(b"name".to_vec(), BValue::bytes(*b"sample.txt"));
    info_dict.insert(b"length".to_vec(), BValue::Int(16384));
    info_dict.insert(b"piece length".to_vec(), BValue::Int(16384));
    info_dict.insert(b"pieces".to_vec(), BValue::bytes(vec![0u8; 20]));
    let info_value = BValue::Dict(info_dict);
    let info_bytes = bencode::encode(&info_value);
    let info_hash = metainfo::info_hash_of(&info_value);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let peer_metadata_id = 3u8;

    let info_bytes_for_server = info_bytes.clone();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let mut buf = [0u8; HANDSHAKE_LEN];
        stream.read_exact(&mut buf).await.unwrap();
        let their_handshake = Handshake::parse(&buf).unwrap();
        assert!(their_handshake.supports_extensions());

        let reply = Handshake::new(their_handshake.info_hash, [7u8; 20], true);
        stream.write_all(&reply.to_bytes()).await.unwrap();

        match read_message(&mut stream).await.unwrap() {
            Message::Extended { extension_id: 0, .. } => {}
            other => panic!("expected extension handshake, got {other:?}"),
        }

        let mut m = BTreeMap::new();
        m.insert(b"ut_metadata".to_vec(), BValue::Int(peer_metadata_id as i64));
        let mut handshake_dict = BTreeMap::new();
        handshake_dict.insert(b"m".to_vec(), BValue::Dict(m));
        let payload = bencode::encode(&BValue::Dict(handshake_dict));
        stream
            .write_all(&Message::Extended { extension_id: 0, payload }.to_bytes())
            .await
            .unwrap();

        match read_message(&mut stream).await.unwrap() {
            Message::Extended { extension_id, .. } if extension_id == peer_metadata_id => {}
            other => panic!("expected metadata request, got {other:?}"),
        }

        let mut header = BTreeMap::new();
        header.insert(b"msg_type".to_vec(), BValue::Int(1));
        header.insert(b"piece".to_vec(), BValue::Int(0));
        header.insert(
            b"total_size".to_vec(),
            BValue::Int(info_bytes_for_server.len() as i64),
        );
        let mut payload = bencode::encode(&BValue::Dict(header));
        payload.extend_from_slice(&info_bytes_for_server);
        stream
            .write_all(
                &Message::Extended {
                    extension_id: extension::OUR_UT_METADATA_ID,
                    payload,
                }
                .to_bytes(),
            )
            .await
            .unwrap();
    });

    let our_peer_id: PeerId = [0x02; 20];
    let mut conn = PeerConnection::connect(addr, info_hash, our_peer_id, true, Duration::from_secs(5))
        .await
        .unwrap();
    assert!(conn.supports_extensions);

    let peer_metadata_id_seen = conn.perform_extension_handshake().await.unwrap();
    assert_eq!(peer_metadata_id_seen, peer_metadata_id);

    let metadata = conn.request_metadata(peer_metadata_id_seen).await.unwrap();
    assert_eq!(metadata.info_bytes, info_bytes);
    assert_eq!(metainfo::info_hash_of(&metadata.info_value), info_hash);
}

/// Scenario: one peer never answers `request` messages. Its share of the
/// work bounces back onto the queue after `socket_timeout` and is picked up
/// by the other, cooperative peer -- the download still completes, with
/// every piece present exactly once.
#[tokio::test]
async fn stalled_peer_requeues_its_piece_onto_a_working_one() {
    let piece_length: usize = 4096;
    let total_len = 2 * piece_length;
    let file: Vec<u8> = (0..total_len).map(|i| (i % 251) as u8).collect();
    let layout = piece_layout(piece_length, total_len);

    let pieces: Vec<PieceWork> = layout
        .iter()
        .enumerate()
        .map(|(index, &(start, len))| {
            let mut hasher = Sha1::new();
            hasher.update(&file[start..start + len]);
            PieceWork {
                index: index as u64,
                length: len as u64,
                offset: start as u64,
                hash: hasher.finalize().into(),
            }
        })
        .collect();

    let info_hash: InfoHash = [0x55; 20];
    let our_peer_id: PeerId = [0x01; 20];

    let stalling = MockPeer::bind().await;
    let addr_stalling = stalling.peer_addr();
    let working = MockPeer::bind().await;
    let addr_working = working.peer_addr();
    stalling.stall_on_requests(info_hash);
    working.serve_pieces(info_hash, piece_length, file.clone());

    let mut config = ClientConfig::default();
    config.max_workers = 2;
    config.max_retries = 1;
    config.socket_timeout = Duration::from_millis(200);

    let completed = scheduler::run(vec![addr_stalling, addr_working], pieces, info_hash, our_peer_id, config)
        .await
        .unwrap();

    let assembled = assembler::assemble(total_len as u64, 2, completed).unwrap();
    assert_eq!(assembled, file);
}
