//! Wire-format definitions for data packets and acknowledgements.
//!
//! Every datagram the sender emits is a [`Packet`]; every datagram the
//! receiver emits is a bare acknowledgement number.  This module is
//! responsible for:
//! - Defining the on-wire binary layout of both.
//! - Serialising / deserialising them.
//! - Computing and validating the CRC-32 over a packet's payload.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     CRC-32 of the payload                     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload ...                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! An acknowledgement is a single signed 32-bit integer: the highest sequence
//! number accepted in order, or `-1` before anything has been accepted.
//!
//! A payload consisting of exactly one `0xFF` byte is the **end-marker**.

use crc::{Crc, CRC_32_ISO_HDLC};
use thiserror::Error;

/// Byte length of the fixed-size header on the wire: seq(4) + checksum(4).
pub const HEADER_LEN: usize = 8;

/// Byte length of an acknowledgement datagram.
pub const ACK_LEN: usize = 4;

/// The single payload byte that marks the end of the stream.
pub const END_MARKER: u8 = 0xFF;

/// Largest sequence number a session may use.
///
/// Capped at `i32::MAX` so that every sequence number, and the `-1` sent
/// before the first frame is accepted, fits the signed acknowledgement field.
pub const MAX_SEQ: u32 = i32::MAX as u32;

/// Largest payload that fits in one UDP datagram alongside the header.
pub const MAX_PAYLOAD: usize = 65_507 - HEADER_LEN;

const OFF_SEQ: usize = 0;
const OFF_CHECKSUM: usize = 4;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Compute the CRC-32 (ISO-HDLC, the zip/Ethernet polynomial) of `payload`.
pub fn checksum(payload: &[u8]) -> u32 {
    CRC32.checksum(payload)
}

/// Classified packet contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Ordinary stream bytes.
    Data(Vec<u8>),
    /// Logical end of the stream.
    EndMarker,
}

/// A data packet: sequence number, payload checksum, payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub seq: u32,
    /// CRC-32 as carried on the wire.  For packets built locally this is the
    /// checksum of `payload`; for decoded packets it may disagree with it.
    pub checksum: u32,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build a data packet, computing the checksum over `payload`.
    pub fn data(seq: u32, payload: Vec<u8>) -> Self {
        Self {
            seq,
            checksum: checksum(&payload),
            payload,
        }
    }

    /// Build the end-marker packet for `seq`.
    pub fn end_marker(seq: u32) -> Self {
        Self::data(seq, vec![END_MARKER])
    }

    /// `true` when the payload is exactly the end-marker byte.
    pub fn is_end_marker(&self) -> bool {
        self.payload.as_slice() == [END_MARKER]
    }

    /// `true` when the carried checksum matches the payload.
    pub fn is_intact(&self) -> bool {
        checksum(&self.payload) == self.checksum
    }

    /// Like [`is_intact`](Self::is_intact) but reports both values on mismatch.
    pub fn verify(&self) -> Result<(), PacketError> {
        let actual = checksum(&self.payload);
        if actual == self.checksum {
            Ok(())
        } else {
            Err(PacketError::ChecksumMismatch {
                seq: self.seq,
                expected: self.checksum,
                actual,
            })
        }
    }

    /// Split into the sequence number and the classified contents.
    pub fn into_frame(self) -> (u32, Frame) {
        if self.is_end_marker() {
            (self.seq, Frame::EndMarker)
        } else {
            (self.seq, Frame::Data(self.payload))
        }
    }

    /// Serialise this packet into a newly allocated byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.extend_from_slice(&self.seq.to_be_bytes());
        buf.extend_from_slice(&self.checksum.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse a [`Packet`] from a raw datagram.
    ///
    /// Only the length is checked; call [`verify`](Self::verify) to validate
    /// the checksum.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::Malformed { len: buf.len() });
        }
        Ok(Self {
            seq: read_u32(buf, OFF_SEQ),
            checksum: read_u32(buf, OFF_CHECKSUM),
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

/// Encode a cumulative acknowledgement.  `None` goes on the wire as `-1`.
pub fn encode_ack(ack: Option<u32>) -> [u8; ACK_LEN] {
    let raw = ack.map_or(-1, |seq| seq as i32);
    raw.to_be_bytes()
}

/// Decode a cumulative acknowledgement.  Any negative value means "nothing
/// accepted yet" and decodes to `None`.
pub fn decode_ack(buf: &[u8]) -> Result<Option<u32>, PacketError> {
    if buf.len() < ACK_LEN {
        return Err(PacketError::MalformedAck { len: buf.len() });
    }
    let raw = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    Ok(u32::try_from(raw).ok())
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("datagram of {len} bytes is shorter than the {header}-byte header", header = HEADER_LEN)]
    Malformed { len: usize },
    #[error("packet {seq}: checksum {actual:#010x} does not match transmitted {expected:#010x}")]
    ChecksumMismatch { seq: u32, expected: u32, actual: u32 },
    #[error("acknowledgement of {len} bytes is shorter than {ack} bytes", ack = ACK_LEN)]
    MalformedAck { len: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_check_value() {
        // Standard check input for CRC-32/ISO-HDLC.
        assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn checksum_is_order_sensitive() {
        assert_ne!(checksum(b"ab"), checksum(b"ba"));
    }

    #[test]
    fn single_byte_change_alters_checksum() {
        let payload = b"the quick brown fox".to_vec();
        let base = checksum(&payload);
        for i in 0..payload.len() {
            let mut altered = payload.clone();
            altered[i] ^= 0x01;
            assert_ne!(checksum(&altered), base, "flip at byte {i} went unnoticed");
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let pkt = Packet::data(42, b"hello".to_vec());
        let decoded = Packet::decode(&pkt.encode()).unwrap();
        assert_eq!(decoded, pkt);
        assert!(decoded.is_intact());
    }

    #[test]
    fn seq_and_checksum_big_endian_on_wire() {
        let pkt = Packet {
            seq: 0x0102_0304,
            checksum: 0x0506_0708,
            payload: vec![9],
        };
        assert_eq!(pkt.encode(), vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn decode_short_buffer_is_malformed() {
        assert_eq!(
            Packet::decode(&[0u8; HEADER_LEN - 1]),
            Err(PacketError::Malformed { len: 7 })
        );
        assert_eq!(Packet::decode(&[]), Err(PacketError::Malformed { len: 0 }));
    }

    #[test]
    fn header_only_decodes_to_empty_payload() {
        let decoded = Packet::decode(&Packet::data(3, vec![]).encode()).unwrap();
        assert_eq!(decoded.seq, 3);
        assert!(decoded.payload.is_empty());
        assert!(decoded.is_intact());
    }

    #[test]
    fn corrupted_payload_fails_verification() {
        let mut bytes = Packet::data(7, b"payload".to_vec()).encode();
        bytes[HEADER_LEN] ^= 0x80;
        let decoded = Packet::decode(&bytes).unwrap();
        assert!(!decoded.is_intact());
        assert!(matches!(
            decoded.verify(),
            Err(PacketError::ChecksumMismatch { seq: 7, .. })
        ));
    }

    #[test]
    fn end_marker_is_single_ff_byte() {
        let pkt = Packet::end_marker(5);
        assert_eq!(pkt.payload, vec![0xFF]);
        assert_eq!(pkt.checksum, checksum(&[0xFF]));
        assert!(pkt.is_end_marker());
        assert_eq!(pkt.into_frame(), (5, Frame::EndMarker));
    }

    #[test]
    fn short_final_chunk_is_not_end_marker() {
        assert!(!Packet::data(1, vec![]).is_end_marker());
        assert!(!Packet::data(1, vec![0xFF, 0xFF]).is_end_marker());
        assert!(!Packet::data(1, vec![0xFE]).is_end_marker());
    }

    #[test]
    fn ack_roundtrip_and_sentinel() {
        assert_eq!(encode_ack(Some(3)), [0, 0, 0, 3]);
        assert_eq!(encode_ack(None), [0xFF; 4]);
        assert_eq!(decode_ack(&encode_ack(Some(MAX_SEQ))), Ok(Some(MAX_SEQ)));
        assert_eq!(decode_ack(&encode_ack(None)), Ok(None));
    }

    #[test]
    fn short_ack_is_malformed() {
        assert_eq!(decode_ack(&[0, 1]), Err(PacketError::MalformedAck { len: 2 }));
    }
}
