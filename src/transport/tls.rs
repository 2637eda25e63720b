use crate::constants::time::{DEFAULT_IO_TIMEOUT, NON_BLOCKING_POLL};
use crate::error::{ProbeError, Result};
use crate::transport::{NetworkInterface, SecureTransport};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::{client::TlsStream, TlsConnector};
use tracing::{debug, warn};

/// Parses every certificate in a PEM document
///
/// # Errors
///
/// Returns `ProbeError::TransportSetup` if the document holds no certificate
pub fn parse_certificates(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut &pem[..])
        .filter_map(std::result::Result::ok)
        .collect();
    if certs.is_empty() {
        return Err(ProbeError::TransportSetup(
            "No certificates found in PEM".to_string(),
        ));
    }
    Ok(certs)
}

/// Parses the first private key in a PEM document (PKCS#8, PKCS#1 or SEC1)
///
/// # Errors
///
/// Returns `ProbeError::TransportSetup` if the document holds no key
pub fn parse_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|e| ProbeError::TransportSetup(format!("Unreadable private key PEM: {e}")))?
        .ok_or_else(|| ProbeError::TransportSetup("No private key found in PEM".to_string()))
}

fn config_builder() -> Result<rustls::ConfigBuilder<ClientConfig, rustls::WantsVerifier>> {
    ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| ProbeError::TransportSetup(format!("TLS protocol setup failed: {e}")))
}

/// TLS socket over a tokio TCP stream
///
/// Trust anchors come from `set_root_ca_cert`; when none were installed the
/// bundled Mozilla root set is used instead.
#[derive(Debug)]
pub struct TlsSocket {
    hostname: Option<String>,
    root_store: RootCertStore,
    client_auth: Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>,
    blocking: bool,
    connect_timeout: Duration,
    io_timeout: Duration,
    opened: bool,
    stream: Option<TlsStream<TcpStream>>,
}

impl TlsSocket {
    #[must_use]
    pub fn new() -> Self {
        Self {
            hostname: None,
            root_store: RootCertStore::empty(),
            client_auth: None,
            blocking: true,
            connect_timeout: Duration::from_secs(30),
            io_timeout: DEFAULT_IO_TIMEOUT,
            opened: false,
            stream: None,
        }
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the send/receive window used in blocking mode
    #[must_use]
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    fn window(&self) -> Duration {
        if self.blocking {
            self.io_timeout
        } else {
            NON_BLOCKING_POLL
        }
    }

    fn stalled(&self) -> ProbeError {
        if self.blocking {
            ProbeError::Timeout
        } else {
            ProbeError::WouldBlock
        }
    }

    fn build_tls_config(&self) -> Result<ClientConfig> {
        let mut root_store = self.root_store.clone();
        if root_store.is_empty() {
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }

        let builder = config_builder()?.with_root_certificates(root_store);
        match &self.client_auth {
            Some((certs, key)) => builder
                .with_client_auth_cert(certs.clone(), key.clone_key())
                .map_err(|e| {
                    ProbeError::TransportSetup(format!("Failed to configure client auth: {e}"))
                }),
            None => Ok(builder.with_no_client_auth()),
        }
    }
}

impl Default for TlsSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureTransport for TlsSocket {
    fn set_hostname(&mut self, hostname: &str) {
        self.hostname = Some(hostname.to_string());
    }

    fn set_root_ca_cert(&mut self, pem: &[u8]) -> Result<()> {
        let certs = parse_certificates(pem)?;
        let mut store = RootCertStore::empty();
        for cert in certs {
            store
                .add(cert)
                .map_err(|e| ProbeError::TransportSetup(format!("Failed to add root cert: {e}")))?;
        }
        self.root_store = store;
        Ok(())
    }

    fn set_client_cert_key(&mut self, cert_pem: &[u8], key_pem: &[u8]) -> Result<()> {
        let certs = parse_certificates(cert_pem)?;
        let key = parse_private_key(key_pem)?;
        // Reject unusable key types now rather than at handshake time.
        config_builder()?
            .with_root_certificates(RootCertStore::empty())
            .with_client_auth_cert(certs.clone(), key.clone_key())
            .map_err(|e| ProbeError::TransportSetup(format!("Client key rejected: {e}")))?;
        self.client_auth = Some((certs, key));
        Ok(())
    }

    fn set_blocking(&mut self, blocking: bool) {
        self.blocking = blocking;
    }

    fn is_blocking(&self) -> bool {
        self.blocking
    }

    fn open<N: NetworkInterface>(&mut self, network: &N) -> Result<()> {
        if self.opened {
            return Err(ProbeError::Connectivity("Socket already open".to_string()));
        }
        if !network.is_up() {
            return Err(ProbeError::Connectivity(
                "Network interface is down".to_string(),
            ));
        }
        self.opened = true;
        Ok(())
    }

    async fn connect(&mut self, addr: SocketAddr) -> Result<()> {
        if !self.opened {
            return Err(ProbeError::Connectivity("Socket not open".to_string()));
        }
        if self.stream.is_some() {
            return Err(ProbeError::AlreadyConnected);
        }
        let hostname = self
            .hostname
            .clone()
            .ok_or_else(|| ProbeError::TransportSetup("Hostname not set".to_string()))?;
        let domain = ServerName::try_from(hostname)
            .map_err(|_| ProbeError::TransportSetup("Invalid server hostname".to_string()))?;

        let connector = TlsConnector::from(Arc::new(self.build_tls_config()?));

        let tcp_stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ProbeError::Timeout)?
            .map_err(|e| ProbeError::Connectivity(format!("TCP connect to {addr} failed: {e}")))?;
        tcp_stream.set_nodelay(true)?;

        let tls_stream = timeout(self.connect_timeout, connector.connect(domain, tcp_stream))
            .await
            .map_err(|_| ProbeError::Timeout)?
            .map_err(|e| ProbeError::Connectivity(format!("TLS handshake failed: {e}")))?;

        let (_, session) = tls_stream.get_ref();
        debug!(
            protocol = ?session.protocol_version(),
            cipher = ?session.negotiated_cipher_suite().map(|s| s.suite()),
            peer_certificates = session.peer_certificates().map_or(0, <[_]>::len),
            "TLS handshake complete"
        );

        self.stream = Some(tls_stream);
        Ok(())
    }

    async fn send(&mut self, buf: &[u8]) -> Result<usize> {
        let window = self.window();
        let stalled = self.stalled();
        let stream = self.stream.as_mut().ok_or(ProbeError::NotConnected)?;

        let written = match timeout(window, stream.write(buf)).await {
            Ok(result) => result?,
            Err(_) => return Err(stalled),
        };
        // Bytes handed to the TLS session are sent on a later flush if this one stalls.
        if let Ok(result) = timeout(window, stream.flush()).await {
            result?;
        }
        Ok(written)
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        let window = self.window();
        let stalled = self.stalled();
        let stream = self.stream.as_mut().ok_or(ProbeError::NotConnected)?;

        match timeout(window, stream.read(buf)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(stalled),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.opened = false;
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                warn!(error = %e, "TLS shutdown did not complete cleanly");
            }
        }
        Ok(())
    }

    fn release(&mut self) {
        self.opened = false;
        self.stream = None;
    }

    fn is_open(&self) -> bool {
        self.opened
    }
}

impl Drop for TlsSocket {
    fn drop(&mut self) {
        self.release();
    }
}
