//! `gbn-transfer`: reliable one-way file transfer over UDP using Go-Back-N.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐   data packets   ┌──────────┐
//!  │  Sender  │─────────────────▶│ Receiver │──▶ output file
//!  └────┬─────┘                  └─────┬────┘
//!       │◀────── cumulative ACKs ──────┘
//!       │                              │
//!  ┌────▼─────────┐           ┌────────▼─────┐
//!  │  GbnSender   │           │ GbnReceiver  │   (pure state machines)
//!  └──────────────┘           └──────────────┘
//!       │ raw datagrams                │
//!  ┌────▼──────────────────────────────▼────┐
//!  │  Datagram: Socket (UDP) | Simulator    │
//!  └────────────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]        - wire format, CRC-32 checksum, ACK encoding
//! - [`chunker`]       - splits the source into payload-sized chunks
//! - [`gbn_sender`]    - outbound sliding window state machine
//! - [`gbn_receiver`]  - inbound window with reorder buffer and cumulative ACKs
//! - [`sender`]        - async sender loop (window fill, ACK wait, retransmit)
//! - [`receiver`]      - async receiver loop (deliver, ACK, terminate)
//! - [`timer`]         - the sender's single retransmission timer
//! - [`config`]        - session parameters and validation
//! - [`error`]         - crate error type
//! - [`socket`]        - datagram transport trait and UDP implementation
//! - [`simulator`]     - lossy/reordering in-process link for testing

pub mod chunker;
pub mod config;
pub mod error;
pub mod gbn_receiver;
pub mod gbn_sender;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod simulator;
pub mod socket;
pub mod timer;

pub use config::{ReceiverConfig, SenderConfig};
pub use error::{Error, Result};
pub use receiver::{ReceiveReport, Receiver};
pub use sender::{SendOutcome, SendReport, Sender};
pub use socket::{Datagram, Socket};
