//! # iot-probe
//!
//! End-to-end connectivity checks for a device identity registered with a
//! cloud IoT broker (AWS IoT Core). A run proves that the certificates,
//! endpoint and policies are correct by walking one complete session:
//!
//! - **MQTT mode**: TLS setup, DNS, mutual-TLS connect, MQTT 3.1.1 handshake,
//!   then one subscribe/publish/echo/unsubscribe exchange per topic group
//!   (the user topic and the thing-shadow update/get/delete topics), and a
//!   guaranteed disconnect and close.
//! - **HTTPS mode**: the same device identity driving the broker's REST
//!   surface (topic publishes and thing-shadow documents) over one
//!   non-blocking TLS connection.
//!
//! Every step reports through `tracing`; a failed step aborts the rest of
//! the run but never skips teardown.
//!
//! ## Example
//!
//! ```rust,no_run
//! use iot_probe::client::MqttSession;
//! use iot_probe::config::ProbeConfig;
//! use iot_probe::transport::{HostNetwork, TlsSocket};
//! use iot_probe::MqttOrchestrator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProbeConfig::from_file("probe.toml")?;
//!     let network = HostNetwork::new();
//!     let orchestrator = MqttOrchestrator::new(
//!         config.mqtt_session()?,
//!         TlsSocket::new(),
//!         MqttSession::new(),
//!         &network,
//!     );
//!     let report = orchestrator.run().await;
//!     println!("success: {}", report.is_success());
//!     Ok(())
//! }
//! ```

#![warn(clippy::pedantic)]

pub mod callback;
pub mod client;
pub mod client_id;
pub mod config;
pub mod constants;
pub mod correlator;
pub mod device;
pub mod encoding;
pub mod error;
pub mod https;
pub mod orchestrator;
pub mod packet;
pub mod payload;
pub mod scratch;
pub mod topic_matching;
pub mod transport;
pub mod types;

pub use client::{MockCall, MockProtocolClient, MqttSession, ProtocolClient};
pub use correlator::ArrivalCounter;
pub use error::{ErrorCategory, ProbeError, Result};
pub use https::{ExchangeReport, HttpsRunner, HttpsRunReport};
pub use orchestrator::{
    EchoOutcome, GroupReport, MqttOrchestrator, SessionReport, SessionState,
};
pub use packet::{FixedHeader, Packet, PacketType};
pub use scratch::{ScratchBuffer, ScratchLease};
pub use transport::{NetworkInterface, SecureTransport};
pub use types::{ConnectOptions, Message, PublishOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl From<u8> for QoS {
    fn from(value: u8) -> Self {
        match value {
            1 => QoS::AtLeastOnce,
            2 => QoS::ExactlyOnce,
            _ => QoS::AtMostOnce,
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        qos as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_values() {
        assert_eq!(u8::from(QoS::AtMostOnce), 0);
        assert_eq!(u8::from(QoS::AtLeastOnce), 1);
        assert_eq!(u8::from(QoS::ExactlyOnce), 2);
    }

    #[test]
    fn test_qos_from_u8() {
        assert_eq!(QoS::from(1), QoS::AtLeastOnce);
        assert_eq!(QoS::from(2), QoS::ExactlyOnce);
        assert_eq!(QoS::from(3), QoS::AtMostOnce);
    }
}
