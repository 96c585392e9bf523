//! In-process network simulator for deterministic testing.
//!
//! Real networks drop, reorder, duplicate and corrupt packets.  To exercise
//! the reliability mechanisms without depending on actual network conditions,
//! [`link`] returns two connected [`Simulator`] endpoints that implement
//! [`Datagram`] and apply a configurable fault model to everything they send:
//!
//! | Fault            | Description                                      |
//! |------------------|--------------------------------------------------|
//! | Packet loss      | Drop a datagram with probability `loss_rate`.    |
//! | Scripted loss    | Drop the datagrams listed in `drop_nth`.         |
//! | Reordering       | Delay a datagram by `reorder_delay`, letting     |
//! |                  | later ones overtake it.                          |
//! | Scripted delay   | Delay the datagrams listed in `delay_nth`.       |
//! | Duplication      | Deliver a datagram twice.                        |
//! | Corruption       | Flip one random bit at or after `corrupt_from`.  |
//!
//! Randomness comes from a seeded RNG so failures are reproducible.  A
//! datagram sent after the peer endpoint is gone vanishes silently, as it
//! would on UDP.

use std::collections::BTreeSet;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;

use crate::socket::Datagram;

type Wire = (Vec<u8>, SocketAddr);

/// Fault model for one direction of a link.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub loss_rate: f64,
    pub reorder_rate: f64,
    /// Fixed delay applied to reordered datagrams.
    pub reorder_delay: Duration,
    pub duplicate_rate: f64,
    pub corrupt_rate: f64,
    /// Offset of the first byte eligible for corruption.  Datagrams no longer
    /// than this are never corrupted.
    pub corrupt_from: usize,
    /// Zero-based indices, in send order, of datagrams that are always dropped.
    pub drop_nth: BTreeSet<u64>,
    /// Zero-based indices of datagrams that are always delayed by `reorder_delay`.
    pub delay_nth: BTreeSet<u64>,
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default: a transparent pass-through.
        Self {
            loss_rate: 0.0,
            reorder_rate: 0.0,
            reorder_delay: Duration::ZERO,
            duplicate_rate: 0.0,
            corrupt_rate: 0.0,
            corrupt_from: 0,
            drop_nth: BTreeSet::new(),
            delay_nth: BTreeSet::new(),
            seed: 0,
        }
    }
}

impl SimulatorConfig {
    /// Pass-through except for the listed datagram indices.
    pub fn dropping(indices: impl IntoIterator<Item = u64>) -> Self {
        Self {
            drop_nth: indices.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Pass-through except that the listed datagram indices arrive `delay`
    /// late.
    pub fn delaying(indices: impl IntoIterator<Item = u64>, delay: Duration) -> Self {
        Self {
            delay_nth: indices.into_iter().collect(),
            reorder_delay: delay,
            ..Self::default()
        }
    }
}

/// Shared record of every datagram an endpoint handed to the link, before
/// faults were applied.
#[derive(Debug, Clone, Default)]
pub struct Tap(Arc<Mutex<Vec<Vec<u8>>>>);

impl Tap {
    pub fn datagrams(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn record(&self, datagram: &[u8]) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(datagram.to_vec());
    }
}

#[derive(Debug)]
struct FaultModel {
    config: SimulatorConfig,
    rng: StdRng,
    sent: u64,
}

/// What happens to one datagram.
struct Fate {
    dropped: bool,
    corrupt_bit: Option<(usize, u8)>,
    copies: usize,
    delayed: bool,
}

impl FaultModel {
    fn decide(&mut self, len: usize) -> Fate {
        let index = self.sent;
        self.sent += 1;
        let dropped =
            self.config.drop_nth.contains(&index) || chance(&mut self.rng, self.config.loss_rate);
        let from = self.config.corrupt_from;
        let corrupt_bit = (len > from && chance(&mut self.rng, self.config.corrupt_rate))
            .then(|| (self.rng.random_range(from..len), self.rng.random_range(0..8u8)));
        let copies = if chance(&mut self.rng, self.config.duplicate_rate) { 2 } else { 1 };
        let delayed = self.config.delay_nth.contains(&index)
            || chance(&mut self.rng, self.config.reorder_rate);
        Fate {
            dropped,
            corrupt_bit,
            copies,
            delayed,
        }
    }
}

fn chance(rng: &mut StdRng, p: f64) -> bool {
    p > 0.0 && rng.random_bool(p.min(1.0))
}

/// One end of a simulated link.
#[derive(Debug)]
pub struct Simulator {
    local_addr: SocketAddr,
    outbound: mpsc::UnboundedSender<Wire>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Wire>>,
    faults: Mutex<FaultModel>,
    tap: Tap,
}

/// Build a connected pair of endpoints.  `a_to_b` applies to datagrams sent
/// by the first endpoint, `b_to_a` to those sent by the second.
pub fn link(a_to_b: SimulatorConfig, b_to_a: SimulatorConfig) -> (Simulator, Simulator) {
    let a_addr = SocketAddr::from(([10, 0, 0, 1], 4000));
    let b_addr = SocketAddr::from(([10, 0, 0, 2], 5000));
    let (to_b, b_rx) = mpsc::unbounded_channel();
    let (to_a, a_rx) = mpsc::unbounded_channel();
    (
        Simulator::new(a_addr, to_b, a_rx, a_to_b),
        Simulator::new(b_addr, to_a, b_rx, b_to_a),
    )
}

impl Simulator {
    fn new(
        local_addr: SocketAddr,
        outbound: mpsc::UnboundedSender<Wire>,
        inbound: mpsc::UnboundedReceiver<Wire>,
        config: SimulatorConfig,
    ) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            local_addr,
            outbound,
            inbound: tokio::sync::Mutex::new(inbound),
            faults: Mutex::new(FaultModel {
                config,
                rng,
                sent: 0,
            }),
            tap: Tap::default(),
        }
    }

    /// Handle on the datagrams this endpoint sends; stays valid after the
    /// endpoint is moved into an engine.
    pub fn tap(&self) -> Tap {
        self.tap.clone()
    }
}

#[async_trait]
impl Datagram for Simulator {
    async fn send_to(&self, buf: &[u8], _dest: SocketAddr) -> io::Result<usize> {
        self.tap.record(buf);
        let (fate, delay) = {
            let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
            (faults.decide(buf.len()), faults.config.reorder_delay)
        };
        if fate.dropped {
            log::debug!("[sim] {} dropped {} bytes", self.local_addr, buf.len());
            return Ok(buf.len());
        }

        let mut datagram = buf.to_vec();
        if let Some((byte, bit)) = fate.corrupt_bit {
            datagram[byte] ^= 1 << bit;
            log::debug!("[sim] {} corrupted byte {byte}", self.local_addr);
        }

        for _ in 0..fate.copies {
            let wire = (datagram.clone(), self.local_addr);
            if fate.delayed {
                let outbound = self.outbound.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = outbound.send(wire);
                });
            } else {
                // Peer gone: the datagram is lost, as on a real network.
                let _ = self.outbound.send(wire);
            }
        }
        Ok(buf.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let mut inbound = self.inbound.lock().await;
        match inbound.recv().await {
            Some((datagram, from)) => {
                let n = datagram.len().min(buf.len());
                buf[..n].copy_from_slice(&datagram[..n]);
                Ok((n, from))
            }
            // Nobody can send to us any more; wait like an idle socket would.
            None => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
