//! Shared fixtures for the loopback integration tests.
//!
//! Every test runs a real listener on `127.0.0.1:0`, a scripted remote
//! endpoint and a plain client socket.

#![allow(dead_code)]

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue, IsCa, Issuer,
    KeyPair, KeyUsagePurpose,
};
use rustls::ServerConfig;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tcp_proxy::proxy::{ProxyServer, RelayConfig, Sequence};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

/// Upper bound for any single step of a test.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Throwaway CA that signs leaf certificates for the test remote.
pub struct TestCa {
    dir: TempDir,
    cert_path: PathBuf,
    ca_key: KeyPair,
    ca_params: CertificateParams,
}

impl TestCa {
    /// Generate a CA and write its certificate to a temp dir.
    pub fn generate() -> Self {
        let ca_key = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();

        let mut ca_params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String("tcp-proxy test CA".to_string()),
        );
        ca_params.distinguished_name = dn;
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];

        let ca_cert = ca_params.clone().self_signed(&ca_key).unwrap();

        let dir = tempfile::Builder::new()
            .prefix("tcp-proxy-ca-")
            .tempdir()
            .unwrap();
        let cert_path = dir.path().join("ca.crt");
        std::fs::write(&cert_path, ca_cert.pem()).unwrap();

        Self {
            dir,
            cert_path,
            ca_key,
            ca_params,
        }
    }

    /// PEM file holding the CA certificate.
    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    /// Server config presenting a leaf for `host` signed by this CA.
    pub fn server_config(&self, host: &str) -> Arc<ServerConfig> {
        let leaf_key = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
        let params = CertificateParams::new(vec![host.to_string()]).unwrap();

        let issuer = Issuer::from_params(&self.ca_params, &self.ca_key);
        let leaf = params.signed_by(&leaf_key, &issuer).unwrap();

        let chain: Vec<CertificateDer<'static>> = vec![leaf.der().clone()];
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(leaf_key.serialize_der()));

        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(chain, key)
            .unwrap();
        Arc::new(config)
    }
}

/// A listener serving in the background.
pub struct RunningProxy {
    pub addr: SocketAddr,
    pub config: Arc<RelayConfig>,
    pub connections: Arc<Sequence>,
    shutdown_tx: watch::Sender<bool>,
}

impl RunningProxy {
    /// Bind on an ephemeral loopback port and start accepting.
    pub async fn start(config: RelayConfig) -> Self {
        let server = ProxyServer::bind("127.0.0.1:0", config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let config = server.relay_config();
        let connections = server.connections();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(server.run(shutdown_rx));

        Self {
            addr,
            config,
            connections,
            shutdown_tx,
        }
    }

    /// Open a client connection through the proxy.
    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }
}

impl Drop for RunningProxy {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Plain remote that reads exactly `expect` bytes, answers with `reply`
/// and closes. The task yields what it read.
pub async fn scripted_remote(expect: usize, reply: &'static [u8]) -> (SocketAddr, JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; expect];
        stream.read_exact(&mut buf).await.unwrap();
        stream.write_all(reply).await.unwrap();
        stream.shutdown().await.unwrap();
        buf
    });

    (addr, handle)
}

/// Same as [`scripted_remote`], behind a TLS server handshake.
pub async fn scripted_tls_remote(
    server_config: Arc<ServerConfig>,
    expect: usize,
    reply: &'static [u8],
) -> (SocketAddr, JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let acceptor = TlsAcceptor::from(server_config);

    let handle = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut stream = acceptor.accept(tcp).await.unwrap();
        let mut buf = vec![0u8; expect];
        stream.read_exact(&mut buf).await.unwrap();
        stream.write_all(reply).await.unwrap();
        stream.shutdown().await.unwrap();
        buf
    });

    (addr, handle)
}

/// TLS remote that completes the handshake, never reads, and after `delay`
/// sends close_notify while keeping the socket open.
pub async fn stalled_tls_remote(server_config: Arc<ServerConfig>, delay: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let acceptor = TlsAcceptor::from(server_config);

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut stream = acceptor.accept(tcp).await.unwrap();
        tokio::time::sleep(delay).await;
        let _ = stream.shutdown().await;
        // Hold the socket until the test runtime goes away.
        let _held = stream;
        std::future::pending::<()>().await;
    });

    addr
}

/// Remote that accepts and immediately drops the socket.
pub async fn dropping_remote() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });

    addr
}

/// Remote that reads whatever arrives first and hangs up.
pub async fn hangup_remote() -> (SocketAddr, JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 4096];
        let n = stream.read(&mut buf).await.unwrap_or(0);
        buf.truncate(n);
        buf
    });

    (addr, handle)
}

/// Write `payload`, then collect everything until the proxy closes.
pub async fn exchange(client: &mut TcpStream, payload: &[u8]) -> Vec<u8> {
    client.write_all(payload).await.unwrap();
    let mut reply = Vec::new();
    tokio::time::timeout(STEP_TIMEOUT, client.read_to_end(&mut reply))
        .await
        .expect("proxy should close the client")
        .unwrap();
    reply
}

/// Await a remote task with the step timeout.
pub async fn join_remote(handle: JoinHandle<Vec<u8>>) -> Vec<u8> {
    tokio::time::timeout(STEP_TIMEOUT, handle)
        .await
        .expect("remote should finish")
        .unwrap()
}

/// Collects every `tracing` line emitted on the current thread.
///
/// `#[tokio::test]` runs on a current-thread runtime, so spawned connection
/// tasks log into the same capture.
#[derive(Clone, Default)]
pub struct LogCapture {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Start capturing; lines are collected until the guard drops.
    pub fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::TRACE)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    /// Everything captured so far.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock().unwrap()).into_owned()
    }

    /// Number of captured lines containing `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.contents()
            .lines()
            .filter(|line| line.contains(needle))
            .count()
    }

    /// Wait until some line contains `needle`.
    pub async fn wait_for(&self, needle: &str) -> bool {
        let deadline = tokio::time::Instant::now() + STEP_TIMEOUT;
        while tokio::time::Instant::now() < deadline {
            if self.count(needle) > 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

/// Writer handed out by [`LogCapture`].
pub struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter(self.buf.clone())
    }
}
