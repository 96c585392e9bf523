//! Entry point for `gbn-transfer`.
//!
//! Parses CLI arguments and dispatches into either **send** or **receive**
//! mode.  All protocol work is delegated to library modules; `main.rs` owns
//! only process setup (logging, argument parsing, file handling).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use gbn_transfer::config::DEFAULT_END_MARKER_RETRIES;
use gbn_transfer::{ReceiverConfig, Receiver, SendOutcome, Sender, SenderConfig, Socket};
use tokio::fs::File;
use tokio::io::{BufReader, BufWriter};

/// Reliable file transfer over UDP using Go-Back-N.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Send a file to a listening receiver.
    Send {
        /// Receiver IP address.
        #[arg(long)]
        dest: IpAddr,
        /// Receiver UDP port.
        #[arg(long)]
        port: u16,
        /// File to send.
        #[arg(long)]
        file: PathBuf,
        /// Maximum payload bytes per packet.
        #[arg(long)]
        packet_size: usize,
        /// Sender window size in packets.
        #[arg(long)]
        window: usize,
        /// Round-trip time estimate in milliseconds.
        #[arg(long)]
        rtt: u64,
        /// Sequence numbers whose first transmission is corrupted (e.g. 1,2,3).
        #[arg(long, value_delimiter = ',')]
        corrupt: Vec<u32>,
        /// Timeouts tolerated while only the end-marker is unacknowledged.
        #[arg(long, default_value_t = DEFAULT_END_MARKER_RETRIES)]
        end_marker_retries: u32,
    },
    /// Receive a file and write it to disk.
    Receive {
        /// Local IP address to bind.
        #[arg(long)]
        ip: IpAddr,
        /// Local UDP port to bind.
        #[arg(long)]
        port: u16,
        /// Output file (created or truncated).
        #[arg(long)]
        out: PathBuf,
        /// Receiver window size in packets.
        #[arg(long)]
        window: usize,
        /// Give up after this many milliseconds without a datagram.
        #[arg(long)]
        idle_timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Send {
            dest,
            port,
            file,
            packet_size,
            window,
            rtt,
            corrupt,
            end_marker_retries,
        } => {
            let dest = SocketAddr::new(dest, port);
            let mut config =
                SenderConfig::new(dest, packet_size, window, Duration::from_millis(rtt));
            config.corrupt = corrupt.into_iter().collect();
            config.end_marker_retries = end_marker_retries;
            config.validate()?;

            let source = File::open(&file)
                .await
                .with_context(|| format!("opening {}", file.display()))?;
            let unspecified = match dest {
                SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            };
            let socket = Socket::bind(SocketAddr::new(unspecified, 0))
                .await
                .context("binding sender socket")?;

            log::info!("Sending {} to {dest}", file.display());
            let report = Sender::new(socket, BufReader::new(source), &config)?
                .run()
                .await
                .with_context(|| format!("sending {} to {dest}", file.display()))?;

            let stats = &report.stats;
            log::info!(
                "Sent {} bytes in {} packets ({} retransmissions, {} timeouts, max {} sends of one packet)",
                stats.bytes_read,
                stats.packets_sent,
                stats.retransmissions,
                stats.timeouts,
                stats.max_transmissions
            );
            if report.outcome == SendOutcome::Unconfirmed {
                log::warn!("Receiver never acknowledged the end-marker; delivery is unconfirmed");
            }
        }
        Mode::Receive {
            ip,
            port,
            out,
            window,
            idle_timeout,
        } => {
            let mut config = ReceiverConfig::new(window);
            config.idle_timeout = idle_timeout.map(Duration::from_millis);
            config.validate()?;

            let bind = SocketAddr::new(ip, port);
            let socket = Socket::bind(bind)
                .await
                .with_context(|| format!("binding receiver socket to {bind}"))?;
            let sink = File::create(&out)
                .await
                .with_context(|| format!("creating {}", out.display()))?;

            log::info!("Receiving into {} on {bind}", out.display());
            let report = Receiver::new(socket, BufWriter::new(sink), &config)?
                .run()
                .await
                .with_context(|| format!("receiving into {}", out.display()))?;

            let stats = &report.stats;
            log::info!(
                "Wrote {} bytes from {:?} ({} duplicates, {} corrupted, {} out of window)",
                report.bytes_written,
                report.peer,
                stats.duplicates,
                stats.corrupted,
                stats.out_of_window
            );
        }
    }
    Ok(())
}
