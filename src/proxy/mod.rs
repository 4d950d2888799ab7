//! The per-connection proxy engine.
//!
//! This module provides:
//! - The listener loop that accepts clients ([`ProxyServer`])
//! - Connection lifecycle and shared shutdown ([`Connection`])
//! - The byte pump for each direction ([`Pipe`])
//! - Match/replace stages applied to each chunk ([`Pipeline`])
//! - TLS unwrapping of the remote leg ([`TlsUnwrap`])
//!
//! # Architecture
//!
//! ```text
//!   client ──plain──▶ ┌───────────────────────────────┐ ──plain/TLS──▶ remote
//!                     │ Connection                    │
//!                     │   Pipe  local → remote        │
//!                     │     read ▸ match ▸ replace ▸  │
//!                     │     log ▸ write               │
//!                     │   Pipe  remote → local        │
//!                     └───────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tcp_proxy::proxy::ProxyServer;
//!
//! let server = ProxyServer::from_settings(&settings).await?;
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! server.run(shutdown_rx).await;
//! ```

pub mod connection;
pub mod error;
pub mod pipe;
pub mod sequence;
pub mod server;
pub mod tls;
pub mod transform;

// Re-export main types for convenient access
pub use connection::{Connection, ConnectionStats, RelayConfig, ShutdownSignal};
pub use error::ProxyError;
pub use pipe::{Direction, Pipe};
pub use sequence::Sequence;
pub use server::{ProxyServer, relay_config, resolve_addr};
pub use tls::{TlsUnwrap, create_tls_connector};
pub use transform::{Match, MatchStage, Pipeline, ReplaceStage, TransformError};
