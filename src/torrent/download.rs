//! Per-piece download: block-level request pipelining over one established
//! peer connection, followed by SHA-1 verification.

use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::Error;

use super::message::Message;
use super::peer::PeerConnection;
use super::PieceWork;

/// Downloads and verifies one piece, retrying on the same connection up to
/// `config.max_retries` times. A choke received mid-piece is treated as a
/// transient condition: the attempt is abandoned, the peer is re-unchoked,
/// and the next attempt starts the piece over from scratch.
pub async fn download_piece_with_retries(
    peer: &mut PeerConnection,
    work: &PieceWork,
    config: &ClientConfig,
) -> Result<Vec<u8>, Error> {
    let mut last_err = Error::PieceVerificationFailed {
        index: work.index as usize,
    };

    for attempt in 1..=config.max_retries {
        if peer.choked {
            if let Err(e) = peer.wait_for_unchoke().await {
                last_err = e;
                continue;
            }
        }

        match download_piece_once(peer, work, config).await {
            Ok(data) => match verify_piece(&data, &work.hash, work.index as usize) {
                Ok(()) => return Ok(data),
                Err(e) => {
                    warn!(piece = work.index, attempt, "piece failed verification");
                    last_err = e;
                }
            },
            Err(e) => {
                warn!(piece = work.index, attempt, error = %e, "piece download attempt failed");
                last_err = e;
            }
        }
    }

    Err(last_err)
}

async fn download_piece_once(
    peer: &mut PeerConnection,
    work: &PieceWork,
    config: &ClientConfig,
) -> Result<Vec<u8>, Error> {
    let piece_len = work.length as usize;
    let block_size = config.block_size as usize;
    let blocks: Vec<(u32, u32)> = (0..piece_len)
        .step_by(block_size)
        .map(|begin| {
            let len = std::cmp::min(block_size, piece_len - begin);
            (begin as u32, len as u32)
        })
        .collect();

    let mut buf = vec![0u8; piece_len];
    let mut received = 0usize;
    let mut next_to_send = 0usize;
    let mut in_flight = 0usize;
    let window = config.pipeline_window;

    while next_to_send < blocks.len() && in_flight < window {
        let (begin, len) = blocks[next_to_send];
        peer.send_message(&Message::Request {
            index: work.index as u32,
            begin,
            length: len,
        })
        .await?;
        next_to_send += 1;
        in_flight += 1;
    }

    while received < blocks.len() {
        match peer.receive_message().await? {
            Message::Piece { index, begin, block } => {
                if index as u64 != work.index {
                    return Err(Error::ProtocolViolation(format!(
                        "expected piece {}, got piece {index}",
                        work.index
                    )));
                }
                let begin = begin as usize;
                if begin + block.len() > buf.len() {
                    return Err(Error::ProtocolViolation(
                        "piece block extends past piece boundary".into(),
                    ));
                }
                buf[begin..begin + block.len()].copy_from_slice(&block);
                received += 1;
                in_flight -= 1;

                if next_to_send < blocks.len() {
                    let (begin, len) = blocks[next_to_send];
                    peer.send_message(&Message::Request {
                        index: work.index as u32,
                        begin,
                        length: len,
                    })
                    .await?;
                    next_to_send += 1;
                    in_flight += 1;
                }
            }
            Message::Choke => {
                peer.choked = true;
                return Err(Error::ProtocolViolation(
                    "choked while downloading piece".into(),
                ));
            }
            Message::KeepAlive | Message::Have(_) => continue,
            other => {
                return Err(Error::ProtocolViolation(format!(
                    "unexpected message while downloading piece: {other:?}"
                )))
            }
        }
    }

    debug!(piece = work.index, bytes = buf.len(), "piece downloaded");
    Ok(buf)
}

fn verify_piece(data: &[u8], expected: &[u8; 20], index: usize) -> Result<(), Error> {
    let mut hasher = Sha1::new();
    hasher.update(data);
    let actual: [u8; 20] = hasher.finalize().into();
    if &actual == expected {
        Ok(())
    } else {
        Err(Error::PieceVerificationFailed { index })
    }
}
