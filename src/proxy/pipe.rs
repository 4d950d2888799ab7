//! One direction of a proxied connection.
//!
//! A [`Pipe`] reads a chunk from its source leg, runs the match and replace
//! stages over it, logs the chunk and writes the (possibly rewritten) bytes
//! to its destination leg before reading again. Chunks are never reordered
//! or coalesced.
//!
//! The loop ends on end-of-stream, on any read or write error, or when the
//! connection's [`ShutdownSignal`] fires because the opposite pipe ended.
//! Whatever ends the loop, the pipe closes the signal on its way out so the
//! opposite pipe stops too. The destination then gets at most
//! [`SHUTDOWN_GRACE`] to shut down cleanly (a TLS leg flushes its close_notify
//! here) before the pipe gives up and lets the socket drop.

use super::connection::ShutdownSignal;
use super::transform::Pipeline;
use crate::telemetry::ColorLogger;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest chunk read from a leg in one go.
pub const CHUNK_SIZE: usize = 0xffff;

/// How long a pipe waits for its destination to shut down on exit.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

/// Which way a pipe moves bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to remote endpoint.
    LocalToRemote,
    /// Remote endpoint to client.
    RemoteToLocal,
}

impl Direction {
    /// Per-chunk activity line.
    pub fn describe(self, len: usize) -> String {
        match self {
            Direction::LocalToRemote => format!(">>> {} bytes sent", len),
            Direction::RemoteToLocal => format!("<<< {} bytes received", len),
        }
    }
}

/// Render relayed bytes for the very-verbose log.
pub fn render_payload(bytes: &[u8], output_hex: bool) -> String {
    if output_hex {
        hex::encode(bytes)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Byte pump for one direction of a connection.
pub struct Pipe<'a> {
    direction: Direction,
    pipeline: &'a Pipeline,
    log: &'a ColorLogger,
    output_hex: bool,
}

impl<'a> Pipe<'a> {
    /// Create a pipe.
    ///
    /// # Arguments
    ///
    /// * `direction` - Which way the pipe moves bytes (used for logging).
    /// * `pipeline` - Match and replace stages shared by the whole process.
    /// * `log` - The owning connection's logger.
    /// * `output_hex` - Log relayed bytes as hex instead of text.
    pub fn new(
        direction: Direction,
        pipeline: &'a Pipeline,
        log: &'a ColorLogger,
        output_hex: bool,
    ) -> Self {
        Self {
            direction,
            pipeline,
            log,
            output_hex,
        }
    }

    /// Pump bytes from `src` to `dst` until either leg ends.
    ///
    /// Returns the number of bytes written to `dst`, which is the
    /// post-replacement length.
    pub async fn run<R, W>(self, mut src: R, mut dst: W, shutdown: &ShutdownSignal) -> u64
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut total: u64 = 0;

        loop {
            let n = tokio::select! {
                result = src.read(&mut buf) => match result {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) => {
                        self.log.warn(format_args!("Read failed '{}'", e));
                        break;
                    }
                },
                _ = shutdown.closed() => break,
            };

            let chunk = &buf[..n];

            for m in self.pipeline.scan(chunk) {
                self.log.info(format_args!("Match #{}: {}", m.id, m.text()));
            }

            let out = self.pipeline.rewrite(chunk);

            self.log.debug(self.direction.describe(out.len()));
            if self.log.trace_enabled() {
                self.log.trace(render_payload(&out, self.output_hex));
            }

            tokio::select! {
                result = dst.write_all(&out) => {
                    if let Err(e) = result {
                        self.log.warn(format_args!("Write failed '{}'", e));
                        break;
                    }
                }
                _ = shutdown.closed() => break,
            }

            total += out.len() as u64;
        }

        shutdown.close();
        // A peer that stopped reading never drains the flush.
        if tokio::time::timeout(SHUTDOWN_GRACE, dst.shutdown()).await.is_err() {
            self.log.debug("Shutdown timed out");
        }
        total
    }
}
