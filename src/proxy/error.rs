//! Error types for proxy operations.
//!
//! This module defines structured error types for the relay:
//! - Startup errors (address resolution, binding, TLS roots)
//! - Per-connection errors (dialing the remote, TLS handshake)

use thiserror::Error;

/// Unified error type for proxy operations.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// I/O error (socket operations, file access).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An address string could not be resolved.
    #[error("Failed to resolve address '{addr}': {source}")]
    Resolve {
        /// The address as given.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The local listener could not be opened.
    #[error("Failed to open local port to listen on {addr}: {source}")]
    Bind {
        /// The address we tried to bind to.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to connect to the remote endpoint.
    #[error("Remote connection failed to '{addr}': {source}")]
    UpstreamConnect {
        /// The address we tried to connect to.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TLS error during setup or handshake.
    #[error("TLS error: {0}")]
    Tls(String),
}

impl From<rustls::Error> for ProxyError {
    fn from(err: rustls::Error) -> Self {
        ProxyError::Tls(err.to_string())
    }
}
