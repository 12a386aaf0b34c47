//! Cross-peer piece scheduling.
//!
//! Each worker owns exactly one peer connection for its lifetime and pulls
//! work from a queue shared with every other worker. The work queue is an
//! `Arc<Mutex<VecDeque<_>>>` rather than a plain channel because workers
//! must be able to push pieces back as well as pop them -- a `PieceVerificationFailed`
//! or dropped connection re-queues the piece for some other worker to try.
//! Completed pieces flow out over an mpsc channel to the assembler.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::error::Error;

use super::download::download_piece_with_retries;
use super::peer::PeerConnection;
use super::tracker::PeerAddr;
use super::{InfoHash, PeerId, PieceWork};

/// A verified piece, ready to be written into the assembler's buffer.
pub struct CompletedPiece {
    pub offset: u64,
    pub data: Vec<u8>,
}

struct WorkItem {
    work: PieceWork,
    requeues: usize,
}

type WorkQueue = Arc<Mutex<VecDeque<WorkItem>>>;

/// Downloads every piece in `pieces` across `peers`, returning completed
/// pieces in whatever order they finish (the assembler reorders by offset).
///
/// Spawns `min(peers.len(), config.max_workers, pieces.len())` worker
/// tasks. Returns `Err` as soon as any piece becomes unrecoverable, or if
/// every worker exits before all pieces complete.
pub async fn run(
    peers: Vec<PeerAddr>,
    pieces: Vec<PieceWork>,
    info_hash: InfoHash,
    our_peer_id: PeerId,
    config: ClientConfig,
) -> Result<Vec<CompletedPiece>, Error> {
    let total = pieces.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    // A piece may bounce between workers on failure; once it has been
    // re-queued more times than there are workers to try it, no peer left
    // in the pool is likely to succeed where the others didn't.
    let max_requeues = config.max_workers.max(1);

    let queue: WorkQueue = Arc::new(Mutex::new(
        pieces
            .into_iter()
            .map(|work| WorkItem { work, requeues: 0 })
            .collect(),
    ));

    let (result_tx, mut result_rx) = mpsc::channel::<Result<CompletedPiece, Error>>(total);

    let worker_count = peers.len().min(config.max_workers).min(total);
    let mut handles = Vec::with_capacity(worker_count);
    for addr in peers.into_iter().take(worker_count) {
        let queue = Arc::clone(&queue);
        let result_tx = result_tx.clone();
        let config = config.clone();
        handles.push(tokio::spawn(async move {
            run_worker(addr, queue, result_tx, info_hash, our_peer_id, config, max_requeues).await;
        }));
    }
    drop(result_tx);

    let mut completed = Vec::with_capacity(total);
    while completed.len() < total {
        match result_rx.recv().await {
            Some(Ok(piece)) => completed.push(piece),
            Some(Err(err)) => return Err(err),
            None => {
                return Err(Error::IncompleteDownload {
                    missing: total - completed.len(),
                    total,
                })
            }
        }
    }

    for handle in handles {
        let _ = handle.await;
    }

    Ok(completed)
}

/// Connects once, performs `HANDSHAKE -> BITFIELD -> INTERESTED -> UNCHOKE`,
/// then loops pulling and downloading pieces until the queue drains or this
/// connection fails. A failure abandons the connection entirely rather than
/// reconnecting -- per the error taxonomy, `NetworkFailure`, `HandshakeMismatch`,
/// `ProtocolViolation`, and `PieceVerificationFailed` are all worker-local
/// and leave the socket's state in question.
async fn run_worker(
    addr: PeerAddr,
    queue: WorkQueue,
    result_tx: mpsc::Sender<Result<CompletedPiece, Error>>,
    info_hash: InfoHash,
    our_peer_id: PeerId,
    config: ClientConfig,
    max_requeues: usize,
) {
    let socket_addr: SocketAddr = addr.0.into();
    let mut peer = match PeerConnection::connect(
        socket_addr,
        info_hash,
        our_peer_id,
        false,
        config.socket_timeout,
    )
    .await
    {
        Ok(peer) => peer,
        Err(err) => {
            warn!(%addr, error = %err, "worker could not connect, its share of the queue goes unserved");
            return;
        }
    };

    if let Err(err) = peer.wait_for_bitfield().await {
        warn!(%addr, error = %err, "worker failed waiting for bitfield");
        return;
    }
    if let Err(err) = peer.wait_for_unchoke().await {
        warn!(%addr, error = %err, "worker failed waiting for unchoke");
        return;
    }

    loop {
        let item = {
            let mut queue = queue.lock().await;
            queue.pop_front()
        };
        let Some(item) = item else {
            break;
        };

        if !peer.has_piece(item.work.index) {
            requeue_or_fail(&queue, item, max_requeues, &result_tx).await;
            continue;
        }

        match download_piece_with_retries(&mut peer, &item.work, &config).await {
            Ok(data) => {
                info!(piece = item.work.index, %addr, "piece verified");
                let piece = CompletedPiece {
                    offset: item.work.offset,
                    data,
                };
                if result_tx.send(Ok(piece)).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                warn!(piece = item.work.index, %addr, error = %err, "piece failed on this peer, abandoning connection");
                requeue_or_fail(&queue, item, max_requeues, &result_tx).await;
                break;
            }
        }
    }
}

async fn requeue_or_fail(
    queue: &WorkQueue,
    mut item: WorkItem,
    max_requeues: usize,
    result_tx: &mpsc::Sender<Result<CompletedPiece, Error>>,
) {
    item.requeues += 1;
    if item.requeues > max_requeues {
        let _ = result_tx
            .send(Err(Error::PieceUnrecoverable {
                index: item.work.index as usize,
            }))
            .await;
        return;
    }
    queue.lock().await.push_back(item);
}
