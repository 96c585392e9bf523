//! Session configuration for both engines.
//!
//! The binary builds these from command-line flags; tests build them directly.
//! Call `validate()` before handing a config to an engine; the engines assume
//! a validated config.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::packet::{MAX_PAYLOAD, MAX_SEQ};

/// Retransmission timeout as a multiple of the round-trip estimate.
pub const RTT_TIMEOUT_FACTOR: u32 = 15;

/// Smallest usable payload size.  With fewer bytes per packet a trailing
/// lone `0xFF` data byte cannot always be re-split away from the end-marker.
pub const MIN_PACKET_SIZE: usize = 3;

/// Largest window either side accepts: one window can never span more
/// sequence numbers than a session has.
pub const MAX_WINDOW: usize = MAX_SEQ as usize;

/// Timeouts tolerated while only the end-marker is outstanding.
pub const DEFAULT_END_MARKER_RETRIES: u32 = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("window size must be at least 1")]
    ZeroWindow,
    #[error("window size {0} exceeds the maximum of {max}", max = MAX_WINDOW)]
    WindowTooLarge(usize),
    #[error("packet size {0} is out of range ({min}..={max})", min = MIN_PACKET_SIZE, max = MAX_PAYLOAD)]
    PacketSize(usize),
    #[error("round-trip time must be non-zero")]
    ZeroRtt,
}

/// Everything the sending side needs for one transfer.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Where data packets are sent.
    pub dest: SocketAddr,
    /// Maximum payload bytes per packet.
    pub packet_size: usize,
    /// Maximum number of unacknowledged packets in flight.
    pub window_size: usize,
    /// Round-trip estimate; the retransmission timeout is derived from it.
    pub rtt: Duration,
    /// Sequence numbers whose first transmission is deliberately corrupted.
    pub corrupt: BTreeSet<u32>,
    /// Consecutive timeouts tolerated once only the end-marker is outstanding.
    pub end_marker_retries: u32,
}

impl SenderConfig {
    pub fn new(dest: SocketAddr, packet_size: usize, window_size: usize, rtt: Duration) -> Self {
        Self {
            dest,
            packet_size,
            window_size,
            rtt,
            corrupt: BTreeSet::new(),
            end_marker_retries: DEFAULT_END_MARKER_RETRIES,
        }
    }

    /// Retransmission timeout: `15 × rtt`.
    pub fn timeout(&self) -> Duration {
        self.rtt * RTT_TIMEOUT_FACTOR
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_window(self.window_size)?;
        if !(MIN_PACKET_SIZE..=MAX_PAYLOAD).contains(&self.packet_size) {
            return Err(ConfigError::PacketSize(self.packet_size));
        }
        if self.rtt.is_zero() {
            return Err(ConfigError::ZeroRtt);
        }
        Ok(())
    }
}

/// Everything the receiving side needs for one transfer.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Number of sequence numbers beyond LFR that are accepted.
    pub window_size: usize,
    /// Give up when the sender stays silent this long.  `None` waits forever.
    pub idle_timeout: Option<Duration>,
}

impl ReceiverConfig {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size,
            idle_timeout: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_window(self.window_size)?;
        Ok(())
    }
}

fn check_window(window_size: usize) -> Result<(), ConfigError> {
    match window_size {
        0 => Err(ConfigError::ZeroWindow),
        n if n > MAX_WINDOW => Err(ConfigError::WindowTooLarge(n)),
        _ => Ok(()),
    }
}
