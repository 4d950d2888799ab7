//! TLS unwrapping for the remote leg.
//!
//! With `--unwrap-tls` the proxy speaks TLS to the remote endpoint while the
//! local client keeps talking plaintext. This module provides:
//! - The shared client connector (platform roots plus an optional PEM bundle)
//! - Server name derivation from the remote address
//! - The per-connection handshake
//!
//! # Example
//!
//! ```ignore
//! use tcp_proxy::proxy::tls::{create_tls_connector, server_name_for, TlsUnwrap};
//!
//! let connector = create_tls_connector(None)?;
//! let unwrap = TlsUnwrap::new(connector, server_name_for("example.com:443", None)?);
//! let tls_stream = unwrap.handshake(tcp_stream).await?;
//! ```

use super::error::ProxyError;
use rustls::ClientConfig;
use rustls_pki_types::{CertificateDer, ServerName};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;

/// Create the TLS connector used for every remote leg.
///
/// The remote certificate is verified against the system root CAs, plus
/// the certificates in `extra_ca_file` when given.
pub fn create_tls_connector(extra_ca_file: Option<&Path>) -> Result<TlsConnector, ProxyError> {
    let mut root_store = rustls::RootCertStore::empty();

    let native_certs = rustls_native_certs::load_native_certs();

    // Log any errors but continue with successfully loaded certs
    for err in native_certs.errors {
        debug!("Warning loading native cert: {}", err);
    }

    for cert in native_certs.certs {
        if let Err(e) = root_store.add(cert) {
            debug!("Warning adding cert to store: {}", e);
        }
    }

    if let Some(path) = extra_ca_file {
        for cert in load_pem_certs(path)? {
            root_store.add(cert)?;
        }
        debug!("Added certificates from {:?}", path);
    }

    if root_store.is_empty() {
        return Err(ProxyError::Tls("No root certificates found".into()));
    }

    debug!("Loaded {} root certificates", root_store.len());

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Read every certificate from a PEM file.
pub fn load_pem_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ProxyError> {
    let pem = fs::read(path)?;

    let certs = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ProxyError::Tls(format!("Failed to parse certificate PEM {:?}: {}", path, e)))?;

    if certs.is_empty() {
        return Err(ProxyError::Tls(format!(
            "No certificates found in {:?}",
            path
        )));
    }

    Ok(certs)
}

/// Host part of a `host:port` address.
///
/// Examples:
/// - `example.com:443` -> `example.com`
/// - `[::1]:443` -> `::1`
/// - `example.com` -> `example.com`
pub fn host_of(addr: &str) -> &str {
    let host = match addr.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => addr,
    };
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

/// Server name used to verify the remote certificate.
///
/// `override_name` wins when given, otherwise the host part of `remote_addr`.
pub fn server_name_for(
    remote_addr: &str,
    override_name: Option<&str>,
) -> Result<ServerName<'static>, ProxyError> {
    let name = override_name.unwrap_or_else(|| host_of(remote_addr));
    ServerName::try_from(name.to_string())
        .map_err(|_| ProxyError::Tls(format!("Invalid server name: {}", name)))
}

/// Client side TLS handshake for the remote leg.
#[derive(Clone)]
pub struct TlsUnwrap {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl TlsUnwrap {
    /// Pair a connector with the name the remote certificate must carry.
    pub fn new(connector: TlsConnector, server_name: ServerName<'static>) -> Self {
        Self {
            connector,
            server_name,
        }
    }

    /// Run the handshake over an already connected socket.
    pub async fn handshake(&self, stream: TcpStream) -> Result<TlsStream<TcpStream>, ProxyError> {
        self.connector
            .connect(self.server_name.clone(), stream)
            .await
            .map_err(|e| ProxyError::Tls(format!("Remote TLS handshake failed: {}", e)))
    }
}

impl fmt::Debug for TlsUnwrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsUnwrap")
            .field("server_name", &self.server_name)
            .finish()
    }
}
