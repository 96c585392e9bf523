//! Go-Back-N receive-side state machine.
//!
//! [`GbnReceiver`] tracks the Last Frame Received (LFR) and the Last
//! Acceptable Frame (`LAF = LFR + window_size`):
//!
//! ```text
//!          LFR                     LAF
//!           │                       │
//!  ─────────┼───────────────────────┼─────────▶ seq space
//!  delivered│ <── reorder buffer ──▶│ rejected
//! ```
//!
//! - Packets with `LFR < seq ≤ LAF` are buffered; the buffer is then drained
//!   from `LFR + 1` upwards, delivering each payload in order and emitting a
//!   cumulative ACK after every delivered frame.
//! - Corrupt, malformed, duplicate and out-of-window packets change nothing
//!   and are answered with a re-ACK of the current LFR.
//! - The end-marker finishes the stream when the drain reaches it.
//!
//! This module only manages state; the caller applies the returned
//! [`ReceiverEvent`]s in order (write payloads, send ACKs).

use std::collections::BTreeMap;

use crate::packet::{Frame, Packet, MAX_SEQ};

/// Action the caller must perform, in the order returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverEvent {
    /// Append these bytes to the output.
    Deliver(Vec<u8>),
    /// Send this cumulative acknowledgement (`None` = nothing accepted yet).
    Ack(Option<u32>),
    /// The end-marker was accepted; stop receiving.
    Finished,
}

/// Per-session counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReceiverStats {
    pub frames_delivered: u64,
    pub bytes_delivered: u64,
    /// In-window packets held back because an earlier one was missing.
    pub buffered: u64,
    pub duplicates: u64,
    pub out_of_window: u64,
    pub corrupted: u64,
    pub malformed: u64,
    pub acks: u64,
}

/// Go-Back-N receive-side state for one transfer.
#[derive(Debug)]
pub struct GbnReceiver {
    /// `LFR + 1`, the sequence number the drain is waiting for.
    next_expected: u32,
    window_size: usize,
    reorder: BTreeMap<u32, Frame>,
    finished: bool,
    stats: ReceiverStats,
}

impl GbnReceiver {
    pub fn new(window_size: usize) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        Self {
            next_expected: 0,
            window_size,
            reorder: BTreeMap::new(),
            finished: false,
            stats: ReceiverStats::default(),
        }
    }

    /// Last Frame Received; `None` before the first frame.
    pub fn lfr(&self) -> Option<u32> {
        self.next_expected.checked_sub(1)
    }

    /// Last Acceptable Frame, `LFR + window_size`.  Widened to `i64` because
    /// LFR starts at −1; saturates for windows beyond the `i64` range.
    pub fn laf(&self) -> i64 {
        let window = i64::try_from(self.window_size).unwrap_or(i64::MAX);
        (i64::from(self.next_expected) - 1).saturating_add(window)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    /// Sequence numbers currently held in the reorder buffer.
    pub fn buffered_seqs(&self) -> impl Iterator<Item = u32> + '_ {
        self.reorder.keys().copied()
    }

    /// `LFR < seq ≤ LAF`.
    pub fn in_window(&self, seq: u32) -> bool {
        seq <= MAX_SEQ && seq >= self.next_expected && i64::from(seq) <= self.laf()
    }

    /// Process one inbound datagram and return the actions it triggers.
    pub fn on_datagram(&mut self, datagram: &[u8]) -> Vec<ReceiverEvent> {
        let packet = match Packet::decode(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                log::debug!("[receiver] dropping datagram: {e}");
                self.stats.malformed += 1;
                return vec![self.ack()];
            }
        };
        if self.finished {
            return vec![self.ack()];
        }
        if let Err(e) = packet.verify() {
            log::debug!("[receiver] {e}");
            self.stats.corrupted += 1;
            return vec![self.ack()];
        }

        let (seq, frame) = packet.into_frame();
        if !self.in_window(seq) {
            if seq < self.next_expected {
                self.stats.duplicates += 1;
                log::debug!("[receiver] duplicate packet {seq} (LFR={:?})", self.lfr());
            } else {
                self.stats.out_of_window += 1;
                log::debug!(
                    "[receiver] packet {seq} outside window (LFR={:?}, LAF={})",
                    self.lfr(),
                    self.laf()
                );
            }
            return vec![self.ack()];
        }

        self.reorder.insert(seq, frame);
        let events = self.drain();
        if events.is_empty() {
            self.stats.buffered += 1;
            log::debug!("[receiver] buffered packet {seq}, waiting for {}", self.next_expected);
        }
        events
    }

    fn drain(&mut self) -> Vec<ReceiverEvent> {
        let mut events = Vec::new();
        while let Some(frame) = self.reorder.remove(&self.next_expected) {
            self.next_expected += 1;
            match frame {
                Frame::Data(bytes) => {
                    self.stats.frames_delivered += 1;
                    self.stats.bytes_delivered += bytes.len() as u64;
                    events.push(ReceiverEvent::Deliver(bytes));
                    events.push(self.ack());
                }
                Frame::EndMarker => {
                    events.push(self.ack());
                    events.push(ReceiverEvent::Finished);
                    self.finished = true;
                    self.reorder.clear();
                    break;
                }
            }
        }
        events
    }

    fn ack(&mut self) -> ReceiverEvent {
        self.stats.acks += 1;
        ReceiverEvent::Ack(self.lfr())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::HEADER_LEN;

    use super::ReceiverEvent::{Ack, Deliver, Finished};

    fn data(seq: u32, payload: &[u8]) -> Vec<u8> {
        Packet::data(seq, payload.to_vec()).encode()
    }

    fn end(seq: u32) -> Vec<u8> {
        Packet::end_marker(seq).encode()
    }

    fn acks(events: &[ReceiverEvent]) -> Vec<Option<u32>> {
        events
            .iter()
            .filter_map(|e| match e {
                Ack(a) => Some(*a),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn initial_state() {
        let r = GbnReceiver::new(4);
        assert_eq!(r.lfr(), None);
        assert_eq!(r.laf(), 3);
        assert!(r.in_window(0));
        assert!(r.in_window(3));
        assert!(!r.in_window(4));
    }

    #[test]
    fn oversized_window_still_accepts_next_packet() {
        let mut r = GbnReceiver::new(usize::MAX);
        assert_eq!(r.laf(), i64::MAX - 1);
        let events = r.on_datagram(&data(0, b"a"));
        assert_eq!(events, vec![Deliver(b"a".to_vec()), Ack(Some(0))]);
        assert_eq!(r.lfr(), Some(0));
    }

    #[test]
    fn in_order_packet_delivered_and_acked() {
        let mut r = GbnReceiver::new(4);
        let events = r.on_datagram(&data(0, b"hello"));
        assert_eq!(events, vec![Deliver(b"hello".to_vec()), Ack(Some(0))]);
        assert_eq!(r.lfr(), Some(0));
        assert_eq!(r.laf(), 4);
    }

    #[test]
    fn out_of_order_arrival_buffers_then_drains() {
        let mut r = GbnReceiver::new(4);
        assert_eq!(acks(&r.on_datagram(&data(0, b"a"))), vec![Some(0)]);

        // Packet 2 ahead of the gap: buffered, no ACK.
        assert!(r.on_datagram(&data(2, b"c")).is_empty());
        assert_eq!(r.buffered_seqs().collect::<Vec<_>>(), vec![2]);
        assert_eq!(r.lfr(), Some(0));

        // Packet 1 fills the gap: 1 and 2 drain together.
        let events = r.on_datagram(&data(1, b"b"));
        assert_eq!(
            events,
            vec![
                Deliver(b"b".to_vec()),
                Ack(Some(1)),
                Deliver(b"c".to_vec()),
                Ack(Some(2)),
            ]
        );
        assert_eq!(r.buffered_seqs().count(), 0);

        assert_eq!(r.on_datagram(&data(3, b"d")), vec![Deliver(b"d".to_vec()), Ack(Some(3))]);
        assert_eq!(r.laf(), 7);
    }

    #[test]
    fn corrupt_packet_is_re_acked_without_state_change() {
        let mut r = GbnReceiver::new(4);
        r.on_datagram(&data(0, b"a"));
        let mut bad = data(1, b"b");
        bad[HEADER_LEN] ^= 0x01;

        assert_eq!(r.on_datagram(&bad), vec![Ack(Some(0))]);
        assert_eq!(r.lfr(), Some(0));
        assert_eq!(r.laf(), 4);
        assert_eq!(r.buffered_seqs().count(), 0);
        assert_eq!(r.stats().corrupted, 1);
    }

    #[test]
    fn corrupt_before_first_frame_acks_minus_one() {
        let mut r = GbnReceiver::new(4);
        let mut bad = data(0, b"a");
        bad[HEADER_LEN] ^= 0x01;
        assert_eq!(r.on_datagram(&bad), vec![Ack(None)]);
    }

    #[test]
    fn malformed_datagram_is_re_acked() {
        let mut r = GbnReceiver::new(4);
        assert_eq!(r.on_datagram(&[1, 2, 3]), vec![Ack(None)]);
        assert_eq!(r.stats().malformed, 1);
    }

    #[test]
    fn duplicate_is_re_acked_and_not_redelivered() {
        let mut r = GbnReceiver::new(4);
        r.on_datagram(&data(0, b"a"));
        assert_eq!(r.on_datagram(&data(0, b"a")), vec![Ack(Some(0))]);
        assert_eq!(r.stats().duplicates, 1);
        assert_eq!(r.stats().frames_delivered, 1);
    }

    #[test]
    fn beyond_laf_is_re_acked_and_not_buffered() {
        let mut r = GbnReceiver::new(2);
        assert_eq!(r.on_datagram(&data(2, b"x")), vec![Ack(None)]);
        assert_eq!(r.buffered_seqs().count(), 0);
        assert_eq!(r.stats().out_of_window, 1);
    }

    #[test]
    fn in_order_end_marker_finishes() {
        let mut r = GbnReceiver::new(4);
        r.on_datagram(&data(0, b"a"));
        assert_eq!(r.on_datagram(&end(1)), vec![Ack(Some(1)), Finished]);
        assert!(r.is_finished());
        assert_eq!(r.lfr(), Some(1));
    }

    #[test]
    fn early_end_marker_waits_for_the_gap() {
        let mut r = GbnReceiver::new(4);
        r.on_datagram(&data(0, b"a"));
        assert!(r.on_datagram(&end(2)).is_empty());
        assert!(!r.is_finished());

        let events = r.on_datagram(&data(1, b"b"));
        assert_eq!(
            events,
            vec![Deliver(b"b".to_vec()), Ack(Some(1)), Ack(Some(2)), Finished]
        );
    }

    #[test]
    fn corrupt_end_marker_is_re_acked() {
        let mut r = GbnReceiver::new(4);
        let mut bad = end(0);
        bad[4] ^= 0xFF;
        assert_eq!(r.on_datagram(&bad), vec![Ack(None)]);
        assert!(!r.is_finished());
    }

    #[test]
    fn any_arrival_order_yields_ordered_output() {
        let chunks: Vec<Vec<u8>> = (0u8..6).map(|i| vec![i; 3]).collect();
        let order = [5, 3, 0, 3, 1, 4, 0, 2, 5, 4];
        let mut r = GbnReceiver::new(8);
        let mut out = Vec::new();
        for &seq in &order {
            for ev in r.on_datagram(&data(seq, &chunks[seq as usize])) {
                if let Deliver(bytes) = ev {
                    out.extend(bytes);
                }
            }
        }
        assert_eq!(out, chunks.concat());
        assert_eq!(r.lfr(), Some(5));
    }
}
