pub mod mock;
pub mod network;
pub mod tls;

use crate::error::Result;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};

pub use mock::{MockNetwork, MockTransport, TransportCall};
pub use network::HostNetwork;
pub use tls::TlsSocket;

/// The network stack a transport is opened on
///
/// Mirrors a device network interface: it is brought up once per process,
/// resolves names, and is torn down after all sessions finish.
pub trait NetworkInterface: Send + Sync {
    /// Brings the interface up
    ///
    /// # Errors
    ///
    /// Returns an error if the interface cannot be brought up
    fn connect(&self) -> impl Future<Output = Result<()>> + Send;

    /// Takes the interface down
    ///
    /// # Errors
    ///
    /// Returns an error if the interface does not shut down cleanly
    fn disconnect(&self) -> impl Future<Output = Result<()>> + Send;

    /// Local address the interface routes through
    ///
    /// # Errors
    ///
    /// Returns an error if the interface has no usable address
    fn ip_address(&self) -> impl Future<Output = Result<IpAddr>> + Send;

    /// Resolves a host name to a socket address with the given port
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::Dns` if the name does not resolve
    fn resolve(&self, host: &str, port: u16) -> impl Future<Output = Result<SocketAddr>> + Send;

    fn is_up(&self) -> bool;
}

/// A TLS stream socket with mutual authentication
///
/// Configuration calls (`set_*`) happen before `open`/`connect`. After
/// `connect`, `send` and `recv` behave according to the blocking mode:
///
/// - blocking: wait up to the socket's I/O timeout, then fail with
///   `ProbeError::Timeout`
/// - non-blocking: return `ProbeError::WouldBlock` when no progress can be
///   made yet
///
/// `recv` returns `Ok(0)` once the peer has closed the stream. `close` is
/// idempotent and `release` is its synchronous counterpart used on drop.
pub trait SecureTransport: Send {
    /// Sets the name the server certificate is verified against
    fn set_hostname(&mut self, hostname: &str);

    /// Installs the trust anchor(s) from PEM text
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::TransportSetup` if no usable certificate is found
    fn set_root_ca_cert(&mut self, pem: &[u8]) -> Result<()>;

    /// Installs the client certificate chain and private key from PEM text
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::TransportSetup` if either part is missing or the
    /// key is not usable for TLS client authentication
    fn set_client_cert_key(&mut self, cert_pem: &[u8], key_pem: &[u8]) -> Result<()>;

    fn set_blocking(&mut self, blocking: bool);

    fn is_blocking(&self) -> bool;

    /// Binds the socket to a network interface
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::Connectivity` if the interface is down or the
    /// socket is already open
    fn open<N: NetworkInterface>(&mut self, network: &N) -> Result<()>;

    /// Connects and performs the TLS handshake
    ///
    /// # Errors
    ///
    /// Returns an error if the socket is not open, the TCP connect fails, or
    /// the handshake is rejected
    fn connect(&mut self, addr: SocketAddr) -> impl Future<Output = Result<()>> + Send;

    /// Sends as much of `buf` as the socket accepts, returning the byte count
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::WouldBlock` in non-blocking mode when nothing
    /// could be sent, or another error on a hard failure
    fn send(&mut self, buf: &[u8]) -> impl Future<Output = Result<usize>> + Send;

    /// Receives into `buf`, returning the byte count (0 at end of stream)
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::WouldBlock` in non-blocking mode when no data is
    /// available yet, or another error on a hard failure
    fn recv(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<usize>> + Send;

    /// Shuts the stream down; calling it again is a no-op
    ///
    /// # Errors
    ///
    /// Implementations report success for an already-closed socket
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Drops the underlying stream without a shutdown exchange
    fn release(&mut self);

    fn is_open(&self) -> bool;
}
