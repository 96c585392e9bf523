//! Crate-level error type.
//!
//! Protocol anomalies (bad checksum, duplicate, out-of-window) never show up
//! here; the engines absorb them with a re-ACK or a retransmission.  Only
//! transport/OS faults and configuration problems are surfaced.

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The source needs more packets than the sequence space allows.
    #[error("sequence number space exhausted after {0}")]
    SequenceExhausted(u32),

    /// A source made of the single byte `0xFF` cannot be told apart from the
    /// end-marker on the wire.
    #[error("source consisting of the single byte 0xFF is indistinguishable from the end-marker")]
    AmbiguousSource,

    #[error("no datagram received for {0:?}")]
    IdleTimeout(Duration),
}

pub type Result<T> = std::result::Result<T, Error>;
