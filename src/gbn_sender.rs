//! Go-Back-N send-side state machine.
//!
//! [`GbnSender`] maintains a sliding window of up to `N` in-flight packets.
//! Sequence numbers count packets, not bytes: packet `k` carries the `k`-th
//! chunk of the source, and the end-marker takes the sequence number after
//! the last chunk.
//!
//! # Protocol contract
//!
//! - At most `window_size` packets may be in flight at once.
//! - ACKs are **cumulative**: `ack = K` means the receiver has accepted every
//!   packet up to and including `K`.
//! - On timeout, the caller retransmits **all** packets in the window,
//!   unchanged (go back to N).
//! - Sequence numbers do not wrap; they are capped at [`MAX_SEQ`].
//!
//! This module only manages state; all socket I/O is the caller's responsibility.

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::packet::{Packet, MAX_SEQ};

// ---------------------------------------------------------------------------
// GbnEntry
// ---------------------------------------------------------------------------

/// A single in-flight packet occupying one slot in the retransmit window.
#[derive(Debug, Clone)]
pub struct GbnEntry {
    pub packet: Packet,
    /// Total number of times this packet has been transmitted.
    pub tx_count: u32,
}

// ---------------------------------------------------------------------------
// GbnSender
// ---------------------------------------------------------------------------

/// Go-Back-N send-side state for one transfer.
///
/// # Sequence-number layout
///
/// ```text
///    base             next_seq
///      │                  │
///  ────┼──────────────────┼──────────────────▶ seq space
///      │ <── in flight ──▶│ <── sendable ───▶
/// ```
#[derive(Debug)]
pub struct GbnSender {
    /// Sequence number of the **oldest** unacked packet (left window edge).
    pub base: u32,

    /// Sequence number to use for the **next** new packet.
    pub next_seq: u32,

    window_size: usize,

    /// In-flight packets ordered by sequence number (front = oldest).
    window: VecDeque<GbnEntry>,

    /// Set once the end-marker has been queued.
    end_marker_seq: Option<u32>,
}

impl GbnSender {
    /// `window_size` is the GBN window size N (≥ 1).
    pub fn new(window_size: usize) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        Self {
            base: 0,
            next_seq: 0,
            window_size,
            window: VecDeque::new(),
            end_marker_seq: None,
        }
    }

    /// `true` when there is room for at least one more in-flight packet.
    pub fn can_send(&self) -> bool {
        self.window.len() < self.window_size
    }

    pub fn in_flight(&self) -> usize {
        self.window.len()
    }

    pub fn has_unacked(&self) -> bool {
        !self.window.is_empty()
    }

    pub fn end_marker_queued(&self) -> bool {
        self.end_marker_seq.is_some()
    }

    /// `true` once the end-marker has been acknowledged.
    pub fn is_complete(&self) -> bool {
        self.end_marker_seq.is_some_and(|seq| self.base > seq)
    }

    /// `true` when every data packet is acknowledged and only the end-marker
    /// is still awaiting its ACK.
    pub fn only_end_marker_outstanding(&self) -> bool {
        self.window.len() == 1 && self.end_marker_seq == Some(self.base)
    }

    /// Queue a data packet carrying `payload` and return it for transmission.
    ///
    /// Check [`can_send`](Self::can_send) first.
    pub fn queue_data(&mut self, payload: Vec<u8>) -> Result<&Packet> {
        debug_assert!(!self.end_marker_queued(), "data queued after the end-marker");
        let seq = self.claim_seq()?;
        Ok(self.push(Packet::data(seq, payload)))
    }

    /// Queue the end-marker and return it for transmission.
    pub fn queue_end_marker(&mut self) -> Result<&Packet> {
        let seq = self.claim_seq()?;
        self.end_marker_seq = Some(seq);
        Ok(self.push(Packet::end_marker(seq)))
    }

    /// Process a cumulative ACK.
    ///
    /// Retires every window entry with a sequence number `≤ ack`, advances
    /// `base` to `ack + 1` and returns the number of retired packets.  ACKs
    /// behind `base` (stale or duplicate) and ACKs for packets never sent
    /// return `0` and change nothing.
    pub fn on_ack(&mut self, ack: u32) -> usize {
        if ack < self.base || ack >= self.next_seq {
            return 0;
        }
        self.base = ack + 1;
        let mut retired = 0;
        while self.window.front().is_some_and(|e| e.packet.seq < self.base) {
            self.window.pop_front();
            retired += 1;
        }
        retired
    }

    /// In-flight packets from oldest to newest.
    pub fn window_entries(&self) -> impl Iterator<Item = &GbnEntry> {
        self.window.iter()
    }

    /// Highest transmission count among in-flight packets, `0` when idle.
    pub fn max_tx_count(&self) -> u32 {
        self.window.iter().map(|e| e.tx_count).max().unwrap_or(0)
    }

    /// Call immediately after retransmitting the entire window.
    pub fn on_retransmit(&mut self) {
        for entry in self.window.iter_mut() {
            entry.tx_count += 1;
        }
    }

    fn claim_seq(&mut self) -> Result<u32> {
        if self.next_seq > MAX_SEQ {
            return Err(Error::SequenceExhausted(MAX_SEQ));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        Ok(seq)
    }

    fn push(&mut self, packet: Packet) -> &Packet {
        debug_assert!(
            self.window.len() < self.window_size,
            "packet queued on a full GBN window ({} / {})",
            self.window.len(),
            self.window_size
        );
        self.window.push_back(GbnEntry { packet, tx_count: 1 });
        &self.window[self.window.len() - 1].packet
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
