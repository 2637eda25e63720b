use crate::packet::connack::ConnectReturnCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProbeError>;

/// Probe errors
///
/// Every step of a session returns one of these instead of panicking. The
/// orchestrators decide from the variant whether a step aborts the run or is
/// only logged.
///
/// # Error Categories
///
/// - **Transport setup**: `TransportSetup`
/// - **Connectivity**: `Connectivity`, `Dns`, `NotConnected`, `AlreadyConnected`, `Io`, `Timeout`
/// - **Handshake**: `ConnectionRefused`
/// - **Operations**: `SubscriptionFailed`, `UnsubscriptionFailed`, `PublishFailed`, `QoSNotSupported`
/// - **Encoding**: `BufferOverflow`, `MalformedPacket`, `ProtocolError`, `InvalidTopicName`, `InvalidTopicFilter`
/// - **HTTP transport**: `Http`
/// - **Configuration**: `Config`
///
/// `WouldBlock` is not a failure: non-blocking sockets return it when no
/// progress can be made yet.
///
/// # Examples
///
/// ```
/// use iot_probe::{ProbeError, Result};
///
/// fn fits(needed: usize, capacity: usize) -> Result<()> {
///     if needed > capacity {
///         return Err(ProbeError::BufferOverflow { needed, capacity });
///     }
///     Ok(())
/// }
///
/// assert!(fits(10, 4).is_err());
/// ```
#[derive(Error, Debug, Clone)]
pub enum ProbeError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Transport setup failed: {0}")]
    TransportSetup(String),

    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("DNS resolution for {0} failed")]
    Dns(String),

    #[error("Connection refused: {0:?}")]
    ConnectionRefused(ConnectReturnCode),

    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Operation would block")]
    WouldBlock,

    #[error("Timeout")]
    Timeout,

    #[error("Subscription to {0} failed")]
    SubscriptionFailed(String),

    #[error("Unsubscription from {0} failed")]
    UnsubscriptionFailed(String),

    #[error("Publish to {0} failed")]
    PublishFailed(String),

    #[error("QoS not supported")]
    QoSNotSupported,

    #[error("Buffer overflow: {needed} bytes needed, {capacity} available")]
    BufferOverflow { needed: usize, capacity: usize },

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("Invalid topic name: {0}")]
    InvalidTopicName(String),

    #[error("Invalid topic filter: {0}")]
    InvalidTopicFilter(String),

    #[error("HTTP transport error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of a [`ProbeError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    TransportSetup,
    Connectivity,
    Handshake,
    Operation,
    Encoding,
    HttpTransport,
    Configuration,
}

impl ProbeError {
    /// Returns true for the non-blocking "try again" signal
    #[must_use]
    pub fn is_would_block(&self) -> bool {
        matches!(self, ProbeError::WouldBlock)
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProbeError::TransportSetup(_) => ErrorCategory::TransportSetup,
            ProbeError::Io(_)
            | ProbeError::Connectivity(_)
            | ProbeError::Dns(_)
            | ProbeError::NotConnected
            | ProbeError::AlreadyConnected
            | ProbeError::WouldBlock
            | ProbeError::Timeout => ErrorCategory::Connectivity,
            ProbeError::ConnectionRefused(_) => ErrorCategory::Handshake,
            ProbeError::SubscriptionFailed(_)
            | ProbeError::UnsubscriptionFailed(_)
            | ProbeError::PublishFailed(_)
            | ProbeError::QoSNotSupported => ErrorCategory::Operation,
            ProbeError::BufferOverflow { .. }
            | ProbeError::ProtocolError(_)
            | ProbeError::MalformedPacket(_)
            | ProbeError::InvalidTopicName(_)
            | ProbeError::InvalidTopicFilter(_) => ErrorCategory::Encoding,
            ProbeError::Http(_) => ErrorCategory::HttpTransport,
            ProbeError::Config(_) => ErrorCategory::Configuration,
        }
    }
}

impl From<std::io::Error> for ProbeError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::WouldBlock => ProbeError::WouldBlock,
            std::io::ErrorKind::TimedOut => ProbeError::Timeout,
            _ => ProbeError::Io(err.to_string()),
        }
    }
}
