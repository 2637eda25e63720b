//! Protocol and probe constants
//!
//! Wire-level values for the MQTT 3.1.1 subset spoken by the session, plus the
//! default sizing and timing used by the connectivity probe.

use crate::packet::PacketType;

/// Fixed header byte 1 values (packet type << 4 | flags)
pub mod fixed_header {
    /// CONNECT packet fixed header (0x10)
    pub const CONNECT: u8 = (super::PacketType::Connect as u8) << 4;

    /// CONNACK packet fixed header (0x20)
    pub const CONNACK: u8 = (super::PacketType::ConnAck as u8) << 4;

    /// PUBLISH packet fixed header base (0x30) - flags vary
    pub const PUBLISH_BASE: u8 = (super::PacketType::Publish as u8) << 4;

    /// PUBACK packet fixed header (0x40)
    pub const PUBACK: u8 = (super::PacketType::PubAck as u8) << 4;

    /// SUBSCRIBE packet fixed header (0x82) - has required flags
    pub const SUBSCRIBE: u8 = (super::PacketType::Subscribe as u8) << 4 | 0x02;

    /// SUBACK packet fixed header (0x90)
    pub const SUBACK: u8 = (super::PacketType::SubAck as u8) << 4;

    /// UNSUBSCRIBE packet fixed header (0xA2) - has required flags
    pub const UNSUBSCRIBE: u8 = (super::PacketType::Unsubscribe as u8) << 4 | 0x02;

    /// UNSUBACK packet fixed header (0xB0)
    pub const UNSUBACK: u8 = (super::PacketType::UnsubAck as u8) << 4;

    /// PINGREQ packet fixed header (0xC0)
    pub const PINGREQ: u8 = (super::PacketType::PingReq as u8) << 4;

    /// PINGRESP packet fixed header (0xD0)
    pub const PINGRESP: u8 = (super::PacketType::PingResp as u8) << 4;

    /// DISCONNECT packet fixed header (0xE0)
    pub const DISCONNECT: u8 = (super::PacketType::Disconnect as u8) << 4;
}

/// Masks for extracting fields from fixed header
pub mod masks {
    /// Mask for extracting packet type from fixed header byte 1 (0xF0)
    pub const PACKET_TYPE: u8 = 0xF0;

    /// Mask for extracting flags from fixed header byte 1 (0x0F)
    pub const FLAGS: u8 = 0x0F;
}

/// PUBLISH flags masks
pub mod publish_flags {
    pub const DUP: u8 = 0x08;
    pub const QOS_MASK: u8 = 0x03;
    pub const QOS_SHIFT: u8 = 1;
    pub const RETAIN: u8 = 0x01;
}

/// CONNECT variable header values
pub mod connect {
    /// Protocol name carried in CONNECT
    pub const PROTOCOL_NAME: &str = "MQTT";

    /// Protocol level for MQTT 3.1.1
    pub const PROTOCOL_LEVEL_V311: u8 = 4;

    /// Clean session flag (bit 1)
    pub const CLEAN_SESSION_FLAG: u8 = 0x02;
}

/// SUBACK return code signalling a refused subscription
pub const SUBACK_FAILURE: u8 = 0x80;

/// String and packet limits
pub mod limits {
    /// Maximum string length in MQTT (65535)
    pub const MAX_STRING_LENGTH: u16 = u16::MAX;

    /// Largest client identifier accepted by the broker contract
    pub const MAX_CLIENT_ID_LENGTH: usize = 128;

    /// Largest packet the session will send or accept
    pub const MAX_MQTT_PACKET_SIZE: usize = 1000;
}

/// Time-related constants
pub mod time {
    use std::time::Duration;

    /// Default keep alive interval (60 seconds)
    pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

    /// How long a subscribe/publish/unsubscribe may wait for its acknowledgement
    pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

    /// Overall wait for a published message to be echoed back
    pub const DEFAULT_ECHO_TIMEOUT: Duration = Duration::from_millis(5000);

    /// Length of a single drive slice inside the echo wait
    pub const DEFAULT_SLICE: Duration = Duration::from_millis(100);

    /// Receive/send window for blocking socket operations
    pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(10);

    /// Poll window used for a single non-blocking socket attempt
    pub const NON_BLOCKING_POLL: Duration = Duration::from_millis(10);
}

/// Endpoint defaults
pub mod endpoint {
    pub const DEFAULT_DOMAIN: &str = "a1fljoeglhtf61-ats.iot.us-east-2.amazonaws.com";
    pub const DEFAULT_MQTT_PORT: u16 = 8883;
    pub const DEFAULT_HTTPS_PORT: u16 = 8443;
    pub const DEFAULT_THING_NAME: &str = "Nuvoton-Mbed-D001";
}

/// Scratch buffer capacity shared by payload and request encoding
pub const DEFAULT_SCRATCH_CAPACITY: usize = 600;

/// Marker looked for on the HTTP status line
pub const HTTP_OK_MARKER: &str = "200 OK";
