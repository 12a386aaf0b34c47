//! Command-line surface: a thin `clap`-derived dispatcher over the library.
//! Each subcommand resolves a [`ClientConfig`], builds the relevant core
//! value, and prints to stdout -- no subcommand contains protocol logic of
//! its own (see `main.rs`).

use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::config::ClientConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "A from-scratch BitTorrent client core")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Maximum concurrent peer-connection workers during a download.
    #[arg(long, global = true)]
    pub max_workers: Option<usize>,

    /// Outstanding pipelined block requests per piece.
    #[arg(long, global = true)]
    pub pipeline_window: Option<usize>,

    /// Retries against the same peer before a piece is re-queued.
    #[arg(long, global = true)]
    pub max_retries: Option<usize>,

    /// Deadline, in seconds, applied to every individual socket operation.
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a bencoded string and print its JSON rendering.
    Decode { input: String },
    /// Print the tracker URL, info hash, piece length, and piece hashes of a torrent file.
    Info { torrent: String },
    /// Print the peer list returned by the torrent's tracker, one `IP:PORT` per line.
    Peers { torrent: String },
    /// Perform the base handshake with a single peer and print its peer id.
    Handshake {
        torrent: String,
        /// Peer address as `IP:PORT`.
        peer: String,
    },
    /// Download and verify a single piece, writing it to `output`.
    #[command(name = "download_piece")]
    DownloadPiece {
        #[arg(short, long)]
        output: String,
        torrent: String,
        piece_index: u64,
    },
    /// Download and verify the complete file, writing it to `output`.
    Download {
        #[arg(short, long)]
        output: String,
        torrent: String,
    },
    /// Parse a magnet URI and print its tracker URL and info hash.
    #[command(name = "magnet_parse")]
    MagnetParse { uri: String },
    /// Perform the base and extension handshake against a magnet link's first peer.
    #[command(name = "magnet_handshake")]
    MagnetHandshake { uri: String },
    /// Complete the metadata exchange for a magnet link and print the resulting info fields.
    #[command(name = "magnet_info")]
    MagnetInfo { uri: String },
}

impl Args {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Builds a `ClientConfig`, applying any flags the user overrode on top
    /// of the protocol's documented defaults.
    pub fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::default();
        if let Some(max_workers) = self.max_workers {
            config.max_workers = max_workers;
        }
        if let Some(pipeline_window) = self.pipeline_window {
            config.pipeline_window = pipeline_window;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(timeout_secs) = self.timeout_secs {
            config.socket_timeout = Duration::from_secs(timeout_secs);
        }
        config
    }
}
