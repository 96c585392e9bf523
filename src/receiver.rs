//! Receiving side of a transfer: drives [`GbnReceiver`] over a [`Datagram`].
//!
//! Every inbound datagram is handed to the state machine; the resulting
//! events are applied in order, so payload bytes reach the sink before the
//! ACK that covers them is sent.  ACKs go back to whichever address the
//! datagram came from.
//!
//! The loop blocks indefinitely between datagrams unless an idle timeout is
//! configured, and ends once the end-marker has been accepted and ACKed.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::config::ReceiverConfig;
use crate::error::{Error, Result};
use crate::gbn_receiver::{GbnReceiver, ReceiverEvent, ReceiverStats};
use crate::packet::encode_ack;
use crate::socket::{is_transient, Datagram, MAX_DATAGRAM};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveReport {
    pub bytes_written: u64,
    /// Source address of the last datagram.
    pub peer: Option<SocketAddr>,
    pub stats: ReceiverStats,
}

/// One receiving session.
pub struct Receiver<T, W> {
    transport: T,
    sink: W,
    state: GbnReceiver,
    idle_timeout: Option<Duration>,
    bytes_written: u64,
}

impl<T: Datagram, W: AsyncWrite + Unpin> Receiver<T, W> {
    pub fn new(transport: T, sink: W, config: &ReceiverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            transport,
            sink,
            state: GbnReceiver::new(config.window_size),
            idle_timeout: config.idle_timeout,
            bytes_written: 0,
        })
    }

    pub fn state(&self) -> &GbnReceiver {
        &self.state
    }

    /// Receive until the end-marker is accepted.  The sink is flushed before
    /// returning, on failure too, so every ACKed byte reaches it.
    pub async fn run(mut self) -> Result<ReceiveReport> {
        let result = self.receive().await;
        if let Err(e) = &result {
            log::warn!(
                "[receiver] stopping after {} bytes: {e}",
                self.bytes_written
            );
            if let Err(flush) = self.sink.flush().await {
                log::warn!("[receiver] flushing output failed: {flush}");
            }
        }
        result
    }

    async fn receive(&mut self) -> Result<ReceiveReport> {
        log::info!("[receiver] listening on {}", self.transport.local_addr());
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut peer = None;

        loop {
            let (n, from) = self.next_datagram(&mut buf).await?;
            if peer.is_none() {
                log::info!("[receiver] first datagram from {from}");
            }
            peer = Some(from);

            for event in self.state.on_datagram(&buf[..n]) {
                match event {
                    ReceiverEvent::Deliver(bytes) => {
                        self.sink.write_all(&bytes).await?;
                        self.bytes_written += bytes.len() as u64;
                    }
                    ReceiverEvent::Ack(ack) => {
                        self.transport.send_to(&encode_ack(ack), from).await?;
                        log::debug!("[receiver] → ACK {ack:?}");
                    }
                    ReceiverEvent::Finished => {
                        self.sink.flush().await?;
                        log::info!(
                            "[receiver] end-marker accepted; {} bytes written",
                            self.bytes_written
                        );
                        return Ok(ReceiveReport {
                            bytes_written: self.bytes_written,
                            peer,
                            stats: self.state.stats().clone(),
                        });
                    }
                }
            }
        }
    }

    async fn next_datagram(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        loop {
            let received = match self.idle_timeout {
                Some(idle) => timeout(idle, self.transport.recv_from(buf))
                    .await
                    .map_err(|_| Error::IdleTimeout(idle))?,
                None => self.transport.recv_from(buf).await,
            };
            match received {
                Ok(received) => return Ok(received),
                Err(e) if is_transient(&e) => {
                    log::debug!("[receiver] ignoring transient receive error: {e}");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
