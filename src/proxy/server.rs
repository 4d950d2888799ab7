//! Listener loop.
//!
//! This module provides the proxy server that:
//! - Resolves the local and remote addresses once at startup
//! - Builds the shared relay settings (TLS connector, transforms)
//! - Accepts client connections and spawns one [`Connection`] task each
//!
//! # Architecture
//!
//! Concurrency is unbounded: every accepted socket gets its own Tokio task,
//! which in turn drives two pipes. Accept errors are logged and the loop
//! keeps serving.
//!
//! # Example
//!
//! ```ignore
//! use tcp_proxy::proxy::ProxyServer;
//!
//! let server = ProxyServer::from_settings(&settings).await?;
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! server.run(shutdown_rx).await;
//!
//! // To stop accepting:
//! shutdown_tx.send(true)?;
//! ```

use super::connection::{Connection, RelayConfig};
use super::error::ProxyError;
use super::sequence::Sequence;
use super::tls::{TlsUnwrap, create_tls_connector, server_name_for};
use super::transform::Pipeline;
use crate::config::Settings;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, lookup_host};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Resolve an address string to the first socket address it names.
///
/// A bare `:PORT` means every interface, as in `0.0.0.0:PORT`.
pub async fn resolve_addr(addr: &str) -> Result<SocketAddr, ProxyError> {
    let target = if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    };

    let mut addrs = lookup_host(target.as_str())
        .await
        .map_err(|source| ProxyError::Resolve {
            addr: addr.to_string(),
            source,
        })?;

    addrs.next().ok_or_else(|| ProxyError::Resolve {
        addr: addr.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses found"),
    })
}

/// Build the shared relay settings from resolved configuration.
///
/// Resolves the remote address, compiles the transforms and, when
/// TLS-unwrap is on, builds the TLS connector.
pub async fn relay_config(settings: &Settings) -> Result<RelayConfig, ProxyError> {
    let remote_addr = resolve_addr(&settings.remote).await?;

    let tls = if settings.unwrap_tls {
        let connector = create_tls_connector(settings.tls_ca_file.as_deref())?;
        let server_name = server_name_for(&settings.remote, settings.tls_server_name.as_deref())?;
        debug!("TLS server name: {:?}", server_name);
        Some(TlsUnwrap::new(connector, server_name))
    } else {
        None
    };

    let pipeline = Pipeline::from_specs(
        settings.match_pattern.as_deref(),
        settings.replace.as_deref(),
    );

    Ok(RelayConfig {
        remote_addr,
        tls,
        disable_nagle: settings.disable_nagle,
        output_hex: settings.output_hex,
        pipeline,
        log_options: settings.log_options(),
    })
}

/// The accept loop.
pub struct ProxyServer {
    listener: TcpListener,
    config: Arc<RelayConfig>,
    /// Connection ids, shared by every accepted socket.
    connections: Arc<Sequence>,
}

impl ProxyServer {
    /// Bind `local` and serve with the given relay settings.
    pub async fn bind(local: &str, config: RelayConfig) -> Result<Self, ProxyError> {
        let local_addr = resolve_addr(local).await?;
        let listener = TcpListener::bind(local_addr)
            .await
            .map_err(|source| ProxyError::Bind {
                addr: local.to_string(),
                source,
            })?;

        Ok(Self {
            listener,
            config: Arc::new(config),
            connections: Arc::new(Sequence::new()),
        })
    }

    /// Resolve, bind and prepare everything `settings` asks for.
    ///
    /// Every error returned here is fatal for the process.
    pub async fn from_settings(settings: &Settings) -> Result<Self, ProxyError> {
        let config = relay_config(settings).await?;
        let server = Self::bind(&settings.local, config).await?;

        info!(
            "Proxying from {} to {}",
            server.local_addr()?,
            settings.remote
        );
        Ok(server)
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ProxyError> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared relay settings.
    pub fn relay_config(&self) -> Arc<RelayConfig> {
        self.config.clone()
    }

    /// Connection id sequence (the last id is the number accepted so far).
    pub fn connections(&self) -> Arc<Sequence> {
        self.connections.clone()
    }

    /// Run the accept loop.
    ///
    /// Returns when the shutdown signal is received. Connections already
    /// spawned keep running on the runtime.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            let id = self.connections.next_id();
                            debug!("Accepted connection #{} from {}", id, peer_addr);
                            self.spawn_connection(Connection::new(
                                id,
                                stream,
                                peer_addr,
                                self.config.clone(),
                            ));
                        }
                        Err(e) => {
                            warn!("Failed to accept connection '{}'", e);
                        }
                    }
                }
                changed = shutdown_rx.changed() => {
                    // A dropped sender also stops the loop.
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Proxy shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Spawn a task to drive a single connection.
    fn spawn_connection(&self, connection: Connection) {
        tokio::spawn(async move {
            let id = connection.id();
            // Failures are already logged by the connection itself.
            if let Err(e) = connection.run().await {
                debug!("Connection #{} ended: {}", id, e);
            }
        });
    }
}
