//! Socket pair with readiness and heartbeats.
//!
//! Demonstrates:
//! - Building a Handler on the current tokio runtime
//! - Monitoring a descriptor owned by the engine
//! - Negotiating a heartbeat interval
//! - Closing the connection and removing the watcher
//!
//! Usage:
//!   cargo run --example socketpair_heartbeat
//!   cargo run --example socketpair_heartbeat -- --debug

// ============================================================================
// Imports
// ============================================================================

use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream as StdUnixStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use amqp_reactor::{Connection, ConnectionHandle, Events, Handler};
use tokio::net::UnixStream;
use tokio::time::sleep;
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const HEARTBEAT_SECS: u16 = 1;
const MESSAGES: &[&[u8]] = &[b"hello\n", b"from\n", b"the peer\n"];

// ============================================================================
// Engine
// ============================================================================

/// Minimal engine: counts inbound bytes and writes a frame per heartbeat.
struct EchoEngine {
    socket: StdUnixStream,
    received: AtomicUsize,
    beats: AtomicUsize,
}

impl Connection for EchoEngine {
    fn process(&self, fd: RawFd, events: Events) {
        println!("[Engine] fd {fd} ready: {events}");

        let mut buf = [0u8; 512];
        loop {
            match (&self.socket).read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    self.received.fetch_add(n, Ordering::Relaxed);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(error = %e, "Read failed");
                    break;
                }
            }
        }
    }

    fn heartbeat(&self) {
        let n = self.beats.fetch_add(1, Ordering::Relaxed) + 1;
        println!("[Engine] heartbeat #{n}");

        if let Err(e) = (&self.socket).write_all(b"heartbeat\n") {
            warn!(error = %e, "Heartbeat write failed");
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let debug = std::env::args().any(|a| a == "--debug");
    init_logging(debug);

    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    println!("=== Socket pair heartbeat ===\n");

    // ========================================================================
    // Setup
    // ========================================================================

    let (local, peer) = StdUnixStream::pair()?;
    let fd = local.as_raw_fd();

    let engine = Arc::new(EchoEngine {
        socket: local,
        received: AtomicUsize::new(0),
        beats: AtomicUsize::new(0),
    });
    let connection: ConnectionHandle = engine.clone();

    let mut handler = Handler::builder().nonblocking(true).build()?;
    handler.monitor(&connection, fd, Events::READABLE)?;
    let accepted = handler.on_negotiate(&connection, HEARTBEAT_SECS);
    println!("[Setup] watching fd {fd}, heartbeat every {accepted}s");

    peer.set_nonblocking(true)?;
    let peer = UnixStream::from_std(peer)?;

    // ========================================================================
    // Traffic
    // ========================================================================

    for message in MESSAGES {
        peer.writable().await?;
        peer.try_write(message)?;
        sleep(Duration::from_millis(300)).await;
    }

    sleep(Duration::from_millis(3_200)).await;

    let mut inbound = Vec::new();
    let mut buf = [0u8; 512];
    loop {
        match peer.try_read(&mut buf) {
            Ok(0) => break,
            Ok(n) => inbound.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) => return Err(e.into()),
        }
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    handler.on_closed(&connection);
    handler.monitor(&connection, fd, Events::NONE)?;

    let frames = String::from_utf8_lossy(&inbound).matches("heartbeat").count();
    println!("\n[Result] engine received {} bytes", engine.received.load(Ordering::Relaxed));
    println!("[Result] engine sent {} heartbeats", engine.beats.load(Ordering::Relaxed));
    println!("[Result] peer saw {frames} heartbeat frames");
    println!("[Result] watchers left: {}", handler.watcher_count());

    Ok(())
}

/// Initialize tracing/logging.
fn init_logging(debug: bool) {
    let filter = if debug {
        "amqp_reactor=trace"
    } else {
        "amqp_reactor=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}
