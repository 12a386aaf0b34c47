//! CLI entry point: resolves a [`ClientConfig`] from flags, dispatches to
//! the torrent engine, and prints results. No subcommand handler contains
//! protocol logic of its own -- that all lives under `torrent::`.

use std::net::SocketAddr;

use anyhow::{anyhow, Context, Result};
use tracing::info;

mod bencode;
mod cli;
mod config;
mod error;
mod torrent;
mod utils;

use config::ClientConfig;
use torrent::magnet::MagnetLink;
use torrent::metainfo::Metainfo;
use torrent::peer::PeerConnection;
use torrent::tracker::PeerAddr;
use torrent::{scheduler, PieceWork};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = cli::Args::parse();
    let config = args.config();

    match args.command {
        cli::Command::Decode { input } => {
            let value = bencode::decode(input.as_bytes())?;
            println!("{}", serde_json::Value::from(&value));
        }
        cli::Command::Info { torrent } => handle_info(&torrent)?,
        cli::Command::Peers { torrent } => handle_peers(&torrent, &config).await?,
        cli::Command::Handshake { torrent, peer } => handle_handshake(&torrent, &peer, &config).await?,
        cli::Command::DownloadPiece {
            output,
            torrent,
            piece_index,
        } => handle_download_piece(&torrent, piece_index, &output, &config).await?,
        cli::Command::Download { output, torrent } => handle_download(&torrent, &output, &config).await?,
        cli::Command::MagnetParse { uri } => handle_magnet_parse(&uri)?,
        cli::Command::MagnetHandshake { uri } => handle_magnet_handshake(&uri, &config).await?,
        cli::Command::MagnetInfo { uri } => handle_magnet_info(&uri, &config).await?,
    }

    Ok(())
}

fn handle_info(path: &str) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {path}"))?;
    let meta = Metainfo::from_bytes(&bytes)?;
    println!("Tracker URL: {}", meta.announce);
    println!("Length: {}", meta.info.length);
    println!("Info Hash: {}", hex::encode(meta.info_hash()));
    println!("Piece Length: {}", meta.info.piece_length);
    println!("Piece Hashes:");
    for hash in meta.info.piece_hashes() {
        println!("{}", hex::encode(hash));
    }
    Ok(())
}

async fn tracker_peers(meta: &Metainfo, config: &ClientConfig) -> Result<Vec<PeerAddr>> {
    let peer_id = utils::generate_peer_id();
    let peers = torrent::tracker::get_peers(
        &meta.announce,
        meta.info_hash(),
        peer_id,
        meta.info.length,
        config.tracker_port,
    )
    .await?;
    if peers.is_empty() {
        return Err(anyhow!("tracker returned no peers"));
    }
    Ok(peers)
}

async fn handle_peers(path: &str, config: &ClientConfig) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {path}"))?;
    let meta = Metainfo::from_bytes(&bytes)?;
    for peer in tracker_peers(&meta, config).await? {
        println!("{peer}");
    }
    Ok(())
}

async fn handle_handshake(path: &str, peer_addr: &str, config: &ClientConfig) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {path}"))?;
    let meta = Metainfo::from_bytes(&bytes)?;
    let addr: SocketAddr = peer_addr
        .parse()
        .with_context(|| format!("parsing peer address {peer_addr}"))?;

    let our_peer_id = utils::generate_peer_id();
    let peer = PeerConnection::connect(addr, meta.info_hash(), our_peer_id, false, config.socket_timeout).await?;
    println!("Peer ID: {}", hex::encode(peer.peer_id));
    Ok(())
}

async fn handle_download_piece(path: &str, piece_index: u64, output: &str, config: &ClientConfig) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {path}"))?;
    let meta = Metainfo::from_bytes(&bytes)?;
    let peers = tracker_peers(&meta, config).await?;

    let all_work = PieceWork::plan(&meta.info);
    let work = all_work
        .into_iter()
        .find(|w| w.index == piece_index)
        .ok_or_else(|| anyhow!("piece index {piece_index} out of range"))?;

    let our_peer_id = utils::generate_peer_id();
    let mut completed = scheduler::run(peers, vec![work], meta.info_hash(), our_peer_id, config.clone()).await?;
    let piece = completed.pop().ok_or_else(|| anyhow!("piece {piece_index} did not complete"))?;

    tokio::fs::write(output, &piece.data).await?;
    info!(piece_index, output, "piece downloaded and verified");
    println!("Piece {piece_index} downloaded to {output}");
    Ok(())
}

async fn handle_download(path: &str, output: &str, config: &ClientConfig) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {path}"))?;
    let meta = Metainfo::from_bytes(&bytes)?;
    let peers = tracker_peers(&meta, config).await?;

    let work = PieceWork::plan(&meta.info);
    let total_pieces = work.len();
    let our_peer_id = utils::generate_peer_id();
    let completed = scheduler::run(peers, work, meta.info_hash(), our_peer_id, config.clone()).await?;
    let file = torrent::assembler::assemble(meta.info.length, total_pieces, completed)?;

    tokio::fs::write(output, &file).await?;
    info!(output, bytes = file.len(), "download complete");
    println!("Downloaded {} to {output}.", meta.info.name);
    Ok(())
}

fn handle_magnet_parse(uri: &str) -> Result<()> {
    let magnet = MagnetLink::parse(uri)?;
    println!("{magnet}");
    Ok(())
}

async fn magnet_first_peer(magnet: &MagnetLink, config: &ClientConfig, left: u64) -> Result<PeerAddr> {
    let tracker = magnet
        .tracker
        .as_ref()
        .ok_or_else(|| anyhow!("magnet link has no tracker URL"))?;
    let peer_id = utils::generate_peer_id();
    let peers = torrent::tracker::get_peers(tracker, magnet.info_hash, peer_id, left, config.tracker_port).await?;
    peers.into_iter().next().ok_or_else(|| anyhow!("tracker returned no peers"))
}

async fn handle_magnet_handshake(uri: &str, config: &ClientConfig) -> Result<()> {
    let magnet = MagnetLink::parse(uri)?;
    let peer_addr = magnet_first_peer(&magnet, config, 16384).await?;

    let our_peer_id = utils::generate_peer_id();
    let mut peer = PeerConnection::connect(
        peer_addr.0.into(),
        magnet.info_hash,
        our_peer_id,
        true,
        config.socket_timeout,
    )
    .await?;
    println!("Peer ID: {}", hex::encode(peer.peer_id));

    if peer.supports_extensions {
        peer.perform_extension_handshake().await?;
    }
    Ok(())
}

async fn handle_magnet_info(uri: &str, config: &ClientConfig) -> Result<()> {
    let magnet = MagnetLink::parse(uri)?;
    // The real file length isn't known until metadata arrives; the tracker
    // query still needs a `left` value, so this follows the reference
    // client's workaround of announcing the metadata piece size instead.
    let peer_addr = magnet_first_peer(&magnet, config, 16384).await?;

    let our_peer_id = utils::generate_peer_id();
    let mut peer = PeerConnection::connect(
        peer_addr.0.into(),
        magnet.info_hash,
        our_peer_id,
        true,
        config.socket_timeout,
    )
    .await?;

    let peer_metadata_id = peer.perform_extension_handshake().await?;
    let metadata = peer.request_metadata(peer_metadata_id).await?;

    let computed_hash = torrent::metainfo::info_hash_of(&metadata.info_value);
    if computed_hash != magnet.info_hash {
        return Err(anyhow!("metadata info hash does not match magnet URI"));
    }

    let info = torrent::metainfo::info_from_bvalue(&metadata.info_value)?;
    if let Some(tracker) = &magnet.tracker {
        println!("Tracker URL: {tracker}");
    }
    println!("Length: {}", info.length);
    println!("Info Hash: {}", hex::encode(computed_hash));
    println!("Piece Length: {}", info.piece_length);
    println!("Piece Hashes:");
    for hash in info.piece_hashes() {
        println!("{}", hex::encode(hash));
    }
    Ok(())
}
