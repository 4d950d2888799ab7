//! A single proxied connection.
//!
//! A [`Connection`] owns the accepted local socket. When run it:
//! 1. Dials the remote endpoint (failing fast if it is unreachable)
//! 2. Performs the TLS client handshake when TLS-unwrap is enabled
//! 3. Starts two [`Pipe`]s, one per direction
//! 4. Waits for both pipes to exit and logs the final byte counts
//!
//! Either pipe ending closes the connection's [`ShutdownSignal`], which stops
//! the other pipe. Each socket half is owned by exactly one pipe and is
//! released once, when the connection future completes.

use super::error::ProxyError;
use super::pipe::{Direction, Pipe};
use super::transform::Pipeline;
use super::tls::TlsUnwrap;
use crate::telemetry::{ColorLogger, LogOptions};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::watch;

/// Settings shared by every connection the listener spawns.
#[derive(Debug)]
pub struct RelayConfig {
    /// Resolved remote endpoint.
    pub remote_addr: SocketAddr,
    /// TLS handshake for the remote leg, if unwrapping.
    pub tls: Option<TlsUnwrap>,
    /// Disable Nagle's algorithm on both legs.
    pub disable_nagle: bool,
    /// Log relayed bytes as hex.
    pub output_hex: bool,
    /// Match and replace stages.
    pub pipeline: Pipeline,
    /// Verbosity and colour toggles.
    pub log_options: LogOptions,
}

impl RelayConfig {
    /// Plain relay to `remote_addr` with no transforms.
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            remote_addr,
            tls: None,
            disable_nagle: false,
            output_hex: false,
            pipeline: Pipeline::passthrough(),
            log_options: LogOptions::default(),
        }
    }
}

/// Close latch shared by the two pipes of a connection.
///
/// Closing is idempotent: only the first [`ShutdownSignal::close`] call has
/// an effect, and everyone awaiting [`ShutdownSignal::closed`] wakes up.
#[derive(Debug)]
pub struct ShutdownSignal {
    closed: AtomicBool,
    tx: watch::Sender<bool>,
}

impl ShutdownSignal {
    /// Create an open signal.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            closed: AtomicBool::new(false),
            tx,
        }
    }

    /// Close the signal. Returns `true` only for the call that closed it.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.tx.send_replace(true);
        true
    }

    /// Whether the signal has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolve once the signal is closed.
    pub async fn closed(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this cannot fail.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Bytes relayed in each direction, after replacement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Bytes written to the remote leg.
    pub sent: u64,
    /// Bytes written to the local leg.
    pub received: u64,
}

/// One accepted client and its remote counterpart.
pub struct Connection {
    id: u64,
    local: TcpStream,
    config: Arc<RelayConfig>,
    log: ColorLogger,
    shutdown: ShutdownSignal,
}

impl Connection {
    /// Wrap an accepted socket.
    ///
    /// # Arguments
    ///
    /// * `id` - Process-wide connection id.
    /// * `local` - The accepted client socket.
    /// * `peer_addr` - Client address, used in the log prefix.
    /// * `config` - Shared relay settings.
    pub fn new(id: u64, local: TcpStream, peer_addr: SocketAddr, config: Arc<RelayConfig>) -> Self {
        let log = ColorLogger::new(log_prefix(peer_addr, id), config.log_options);
        Self {
            id,
            local,
            config,
            log,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Process-wide connection id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Dial the remote, relay until either leg ends, and tear down.
    ///
    /// Dial and handshake failures are logged and returned; the local socket
    /// is closed without relaying anything.
    pub async fn run(mut self) -> Result<ConnectionStats, ProxyError> {
        let result = self.open_and_relay().await;
        if let Err(ref e) = result {
            self.log.warn(format_args!("Remote connection failed: {}", e));
        }
        result
    }

    async fn open_and_relay(&mut self) -> Result<ConnectionStats, ProxyError> {
        let config = self.config.clone();
        let remote_addr = config.remote_addr;
        let remote = TcpStream::connect(remote_addr)
            .await
            .map_err(|source| ProxyError::UpstreamConnect {
                addr: remote_addr.to_string(),
                source,
            })?;

        if config.disable_nagle {
            self.local.set_nodelay(true)?;
            remote.set_nodelay(true)?;
        }

        match &config.tls {
            None => {
                self.log_opened(&remote);
                Ok(self.relay(remote).await)
            }
            Some(tls) => {
                self.log.info("Unwrapping TLS");
                let local_addr = remote.local_addr().ok();
                let tls_stream = tls.handshake(remote).await?;
                self.log.info(format_args!(
                    "Opened {} >>> {} (TLS)",
                    display_addr(local_addr),
                    remote_addr
                ));
                Ok(self.relay(tls_stream).await)
            }
        }
    }

    fn log_opened(&self, remote: &TcpStream) {
        self.log.info(format_args!(
            "Opened {} >>> {}",
            display_addr(remote.local_addr().ok()),
            display_addr(remote.peer_addr().ok())
        ));
    }

    async fn relay<S>(&mut self, remote: S) -> ConnectionStats
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (local_read, local_write) = self.local.split();
        let (remote_read, remote_write) = tokio::io::split(remote);

        let pipeline = &self.config.pipeline;
        let hex = self.config.output_hex;

        let outbound = Pipe::new(Direction::LocalToRemote, pipeline, &self.log, hex).run(
            local_read,
            remote_write,
            &self.shutdown,
        );
        let inbound = Pipe::new(Direction::RemoteToLocal, pipeline, &self.log, hex).run(
            remote_read,
            local_write,
            &self.shutdown,
        );

        let (sent, received) = tokio::join!(outbound, inbound);

        let stats = ConnectionStats { sent, received };
        self.log.info(format_args!(
            "Closed ({} bytes sent, {} bytes received)",
            stats.sent, stats.received
        ));
        stats
    }
}

/// Log prefix identifying a connection by client address and id.
pub fn log_prefix(peer_addr: SocketAddr, id: u64) -> String {
    format!("Connection #{}-{:03} ", peer_addr, id)
}

fn display_addr(addr: Option<SocketAddr>) -> String {
    addr.map(|a| a.to_string())
        .unwrap_or_else(|| "?".to_string())
}
