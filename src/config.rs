//! Tunables the distilled protocol hard-codes as constants, gathered so the
//! CLI can override them without the core reaching for globals.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Port advertised to the tracker as the port we listen on.
    pub tracker_port: u16,
    /// Size of a request block, in bytes. BEP-3 fixes this at 16 KiB in practice.
    pub block_size: u32,
    /// Outstanding `request` messages pipelined per piece (W in the design doc).
    pub pipeline_window: usize,
    /// Maximum concurrent peer-connection workers (C in the design doc).
    pub max_workers: usize,
    /// Retries against the same peer before a piece is re-queued (R in the design doc).
    pub max_retries: usize,
    /// Deadline applied to every individual socket operation.
    pub socket_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tracker_port: 6881,
            block_size: 16 * 1024,
            pipeline_window: 5,
            max_workers: 5,
            max_retries: 3,
            socket_timeout: Duration::from_secs(30),
        }
    }
}
