use crate::constants::connect::PROTOCOL_LEVEL_V311;
use crate::constants::time::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_KEEP_ALIVE};
use crate::packet::publish::PublishPacket;
use crate::QoS;
use std::time::Duration;

/// Handshake parameters for a protocol session
///
/// The protocol level is pinned to MQTT 3.1.1 and the clean session flag is
/// always set: the target broker disconnects clients that ask for a
/// persistent session, so neither is configurable.
///
/// # Examples
///
/// ```
/// use iot_probe::ConnectOptions;
/// use std::time::Duration;
///
/// let options = ConnectOptions::new("0000A1B2-0000C3D4-0000E5F6")
///     .with_keep_alive(Duration::from_secs(30));
/// assert!(options.clean_session());
/// assert_eq!(options.protocol_level(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub client_id: String,
    pub keep_alive: Duration,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
    /// Upper bound on waiting for CONNACK/SUBACK/PUBACK/UNSUBACK
    pub command_timeout: Duration,
    protocol_level: u8,
    clean_session: bool,
}

impl ConnectOptions {
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            keep_alive: DEFAULT_KEEP_ALIVE,
            username: None,
            password: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            protocol_level: PROTOCOL_LEVEL_V311,
            clean_session: true,
        }
    }

    #[must_use]
    pub fn with_keep_alive(mut self, duration: Duration) -> Self {
        self.keep_alive = duration;
        self
    }

    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<Vec<u8>>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn protocol_level(&self) -> u8 {
        self.protocol_level
    }

    #[must_use]
    pub fn clean_session(&self) -> bool {
        self.clean_session
    }

    /// Keep alive in whole seconds, saturating at the wire maximum
    #[must_use]
    pub fn keep_alive_secs(&self) -> u16 {
        u16::try_from(self.keep_alive.as_secs()).unwrap_or(u16::MAX)
    }
}

/// Delivery options for an outgoing message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
}

impl PublishOptions {
    /// At-least-once, not retained, not a duplicate
    #[must_use]
    pub fn at_least_once() -> Self {
        Self {
            qos: QoS::AtLeastOnce,
            retain: false,
            dup: false,
        }
    }
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self::at_least_once()
    }
}

/// A message delivered to a subscription callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
    pub packet_id: Option<u16>,
}

impl Message {
    /// Payload as text, with invalid UTF-8 replaced
    #[must_use]
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

impl From<PublishPacket> for Message {
    fn from(packet: PublishPacket) -> Self {
        Self {
            topic: packet.topic_name,
            payload: packet.payload,
            qos: packet.qos,
            retain: packet.retain,
            dup: packet.dup,
            packet_id: packet.packet_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_options_pinned_fields() {
        let options = ConnectOptions::new("id")
            .with_keep_alive(Duration::from_secs(90))
            .with_credentials("user", b"pw".to_vec());
        assert_eq!(options.protocol_level(), 4);
        assert!(options.clean_session());
        assert_eq!(options.keep_alive_secs(), 90);
        assert_eq!(options.username.as_deref(), Some("user"));
    }

    #[test]
    fn test_keep_alive_saturates() {
        let options = ConnectOptions::new("id").with_keep_alive(Duration::from_secs(100_000));
        assert_eq!(options.keep_alive_secs(), u16::MAX);
    }

    #[test]
    fn test_publish_defaults() {
        let options = PublishOptions::default();
        assert_eq!(options.qos, QoS::AtLeastOnce);
        assert!(!options.retain);
        assert!(!options.dup);
    }

    #[test]
    fn test_message_from_packet() {
        let packet = PublishPacket::new("a/b", b"hi".to_vec(), QoS::AtLeastOnce)
            .with_packet_id(3)
            .with_dup(true);
        let message = Message::from(packet);
        assert_eq!(message.topic, "a/b");
        assert_eq!(message.payload_str(), "hi");
        assert_eq!(message.packet_id, Some(3));
        assert!(message.dup);
    }
}
