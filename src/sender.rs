//! Sending side of a transfer: drives [`GbnSender`] over a [`Datagram`].
//!
//! # Main loop
//!
//! ```text
//!   ┌──────────────┐  window has room   ┌──────────────┐
//!   │ fill window  │◀───────────────────│ ACK advanced │
//!   └──────┬───────┘                    └──────▲───────┘
//!          │ wait until timer deadline         │
//!          ▼                                   │
//!   ┌──────────────┐        ACK                │
//!   │  await ACK   │───────────────────────────┘
//!   └──────┬───────┘
//!          │ deadline passed
//!          ▼
//!   retransmit the whole window, restart timer
//! ```
//!
//! The loop ends when the end-marker is acknowledged, or when only the
//! end-marker is outstanding and `end_marker_retries` further timeouts pass
//! without an ACK.  The latter is reported as [`SendOutcome::Unconfirmed`]:
//! the receiver may or may not have finished.

use std::collections::BTreeSet;
use std::net::SocketAddr;

use tokio::io::AsyncRead;
use tokio::time::timeout_at;

use crate::chunker::Chunker;
use crate::config::SenderConfig;
use crate::error::Result;
use crate::gbn_sender::GbnSender;
use crate::packet::{decode_ack, HEADER_LEN};
use crate::socket::{is_transient, Datagram};
use crate::timer::RetransmitTimer;

/// How a transfer ended from the sender's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The receiver acknowledged the end-marker.
    Confirmed,
    /// Gave up waiting for the end-marker's ACK.
    Unconfirmed,
}

/// Per-session counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SenderStats {
    /// First transmissions, end-marker included.
    pub packets_sent: u64,
    pub retransmissions: u64,
    pub timeouts: u64,
    pub acks_received: u64,
    /// ACKs that retired nothing (duplicates, `-1`, or ahead of `next_seq`).
    pub stale_acks: u64,
    pub malformed_acks: u64,
    pub bytes_read: u64,
    /// Most transmissions any single packet needed.
    pub max_transmissions: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub outcome: SendOutcome,
    pub stats: SenderStats,
}

enum AckWait {
    Ack(Option<u32>),
    TimedOut,
}

/// One sending session.
pub struct Sender<T, R> {
    transport: T,
    dest: SocketAddr,
    state: GbnSender,
    chunker: Chunker<R>,
    timer: RetransmitTimer,
    /// Sequence numbers whose first transmission gets a flipped payload bit.
    corrupt: BTreeSet<u32>,
    end_marker_retries: u32,
    stats: SenderStats,
}

impl<T: Datagram, R: AsyncRead + Unpin> Sender<T, R> {
    pub fn new(transport: T, source: R, config: &SenderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            transport,
            dest: config.dest,
            state: GbnSender::new(config.window_size),
            chunker: Chunker::new(source, config.packet_size),
            timer: RetransmitTimer::new(config.timeout()),
            corrupt: config.corrupt.clone(),
            end_marker_retries: config.end_marker_retries,
            stats: SenderStats::default(),
        })
    }

    pub fn state(&self) -> &GbnSender {
        &self.state
    }

    /// Run the transfer to completion.
    pub async fn run(mut self) -> Result<SendReport> {
        log::info!(
            "[sender] sending to {} (timeout {:?})",
            self.dest,
            self.timer.timeout()
        );
        let mut end_marker_timeouts = 0u32;

        loop {
            self.fill_window().await?;

            match self.await_ack().await? {
                AckWait::Ack(ack) => {
                    self.on_ack_received(ack);
                    if self.state.is_complete() {
                        log::info!("[sender] end-marker acknowledged");
                        return Ok(self.report(SendOutcome::Confirmed));
                    }
                }
                AckWait::TimedOut => {
                    if self.state.only_end_marker_outstanding() {
                        if end_marker_timeouts >= self.end_marker_retries {
                            log::warn!(
                                "[sender] no ACK for end-marker {} after {} retransmission(s); giving up",
                                self.state.base,
                                end_marker_timeouts
                            );
                            return Ok(self.report(SendOutcome::Unconfirmed));
                        }
                        end_marker_timeouts += 1;
                    }
                    self.on_timeout().await?;
                }
            }
        }
    }

    /// Queue and transmit packets while the window has room.  Queues the
    /// end-marker once the source is exhausted.
    async fn fill_window(&mut self) -> Result<()> {
        while self.state.can_send() && !self.state.end_marker_queued() {
            let (seq, mut datagram) = match self.chunker.next_chunk().await? {
                Some(chunk) => {
                    let packet = self.state.queue_data(chunk)?;
                    (packet.seq, packet.encode())
                }
                None => {
                    let packet = self.state.queue_end_marker()?;
                    log::debug!("[sender] source exhausted; end-marker is packet {}", packet.seq);
                    (packet.seq, packet.encode())
                }
            };
            if self.corrupt.remove(&seq) {
                log::info!("[sender] corrupting first transmission of packet {seq}");
                corrupt_payload(&mut datagram);
            }
            self.transport.send_to(&datagram, self.dest).await?;
            self.stats.packets_sent += 1;
            self.stats.max_transmissions = self.stats.max_transmissions.max(1);
            self.timer.arm();
            log::debug!(
                "[sender] → packet {seq} len={} in_flight={}",
                datagram.len() - HEADER_LEN,
                self.state.in_flight()
            );
        }
        Ok(())
    }

    /// Wait for the next well-formed ACK until the retransmission deadline.
    async fn await_ack(&mut self) -> Result<AckWait> {
        self.timer.arm();
        let Some(deadline) = self.timer.deadline() else {
            return Ok(AckWait::TimedOut);
        };
        let mut buf = [0u8; 64];
        loop {
            let (n, from) = match timeout_at(deadline, self.transport.recv_from(&mut buf)).await {
                Err(_elapsed) => return Ok(AckWait::TimedOut),
                Ok(Ok(received)) => received,
                Ok(Err(e)) if is_transient(&e) => {
                    log::debug!("[sender] ignoring transient receive error: {e}");
                    continue;
                }
                Ok(Err(e)) => return Err(e.into()),
            };
            match decode_ack(&buf[..n]) {
                Ok(ack) => return Ok(AckWait::Ack(ack)),
                Err(e) => {
                    self.stats.malformed_acks += 1;
                    log::debug!("[sender] dropping datagram from {from}: {e}");
                }
            }
        }
    }

    fn on_ack_received(&mut self, ack: Option<u32>) {
        self.stats.acks_received += 1;
        let retired = ack.map_or(0, |ack| self.state.on_ack(ack));
        if retired == 0 {
            self.stats.stale_acks += 1;
            log::debug!("[sender] ← stale ACK {ack:?} (base={})", self.state.base);
            return;
        }
        log::debug!(
            "[sender] ← ACK {ack:?} retired {retired}; base={} next_seq={}",
            self.state.base,
            self.state.next_seq
        );
        if self.state.has_unacked() {
            self.timer.restart();
        } else {
            self.timer.disarm();
        }
    }

    /// Go-Back-N step: resend every packet in the window, oldest first.
    async fn on_timeout(&mut self) -> Result<()> {
        self.stats.timeouts += 1;
        let datagrams: Vec<(u32, Vec<u8>)> = self
            .state
            .window_entries()
            .map(|e| (e.packet.seq, e.packet.encode()))
            .collect();
        log::info!(
            "[sender] timeout waiting for ACK; resending {} packet(s) from {}",
            datagrams.len(),
            self.state.base
        );
        for (seq, datagram) in datagrams {
            self.transport.send_to(&datagram, self.dest).await?;
            self.stats.retransmissions += 1;
            log::debug!("[sender] ↻ packet {seq}");
        }
        self.state.on_retransmit();
        let most = self.state.max_tx_count();
        self.stats.max_transmissions = self.stats.max_transmissions.max(most);
        self.timer.restart();
        Ok(())
    }

    fn report(&self, outcome: SendOutcome) -> SendReport {
        let mut stats = self.stats.clone();
        stats.bytes_read = self.chunker.bytes_read();
        SendReport { outcome, stats }
    }
}

/// Flip one payload bit, leaving the transmitted checksum stale.
fn corrupt_payload(datagram: &mut [u8]) {
    if let Some(last) = datagram.last_mut() {
        *last ^= 0x01;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;

    #[test]
    fn corrupt_payload_breaks_checksum() {
        let mut datagram = Packet::data(1, b"abc".to_vec()).encode();
        corrupt_payload(&mut datagram);
        let decoded = Packet::decode(&datagram).unwrap();
        assert_eq!(decoded.seq, 1);
        assert!(!decoded.is_intact());
    }

    #[test]
    fn corrupted_end_marker_is_no_longer_an_end_marker() {
        let mut datagram = Packet::end_marker(4).encode();
        corrupt_payload(&mut datagram);
        let decoded = Packet::decode(&datagram).unwrap();
        assert!(!decoded.is_end_marker());
        assert!(!decoded.is_intact());
    }
}
