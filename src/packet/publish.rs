use crate::constants::publish_flags;
use crate::encoding::{decode_string, encode_string};
use crate::error::{ProbeError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::QoS;
use bytes::{Buf, BufMut};

/// MQTT PUBLISH packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    pub topic_name: String,
    /// Present for `QoS` > 0
    pub packet_id: Option<u16>,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
}

impl PublishPacket {
    #[must_use]
    pub fn new(topic_name: impl Into<String>, payload: impl Into<Vec<u8>>, qos: QoS) -> Self {
        Self {
            topic_name: topic_name.into(),
            packet_id: None,
            payload: payload.into(),
            qos,
            retain: false,
            dup: false,
        }
    }

    /// Sets the packet identifier; ignored for `QoS` 0
    #[must_use]
    pub fn with_packet_id(mut self, id: u16) -> Self {
        if self.qos != QoS::AtMostOnce {
            self.packet_id = Some(id);
        }
        self
    }

    #[must_use]
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    #[must_use]
    pub fn with_dup(mut self, dup: bool) -> Self {
        self.dup = dup;
        self
    }
}

impl MqttPacket for PublishPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Publish
    }

    fn flags(&self) -> u8 {
        let mut flags = u8::from(self.qos) << publish_flags::QOS_SHIFT;
        if self.dup {
            flags |= publish_flags::DUP;
        }
        if self.retain {
            flags |= publish_flags::RETAIN;
        }
        flags
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.topic_name.contains(['+', '#']) {
            return Err(ProbeError::InvalidTopicName(self.topic_name.clone()));
        }
        encode_string(buf, &self.topic_name)?;
        if self.qos != QoS::AtMostOnce {
            let packet_id = self.packet_id.ok_or_else(|| {
                ProbeError::ProtocolError("QoS > 0 PUBLISH requires a packet identifier".to_string())
            })?;
            buf.put_u16(packet_id);
        }
        buf.put_slice(&self.payload);
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        let qos_bits = (fixed_header.flags >> publish_flags::QOS_SHIFT) & publish_flags::QOS_MASK;
        let qos = match qos_bits {
            0 => QoS::AtMostOnce,
            1 => QoS::AtLeastOnce,
            2 => QoS::ExactlyOnce,
            _ => {
                return Err(ProbeError::MalformedPacket(
                    "PUBLISH with QoS 3".to_string(),
                ))
            }
        };

        let start = buf.remaining();
        let topic_name = decode_string(buf)?;
        let packet_id = if qos == QoS::AtMostOnce {
            None
        } else {
            if buf.remaining() < 2 {
                return Err(ProbeError::MalformedPacket(
                    "PUBLISH missing packet identifier".to_string(),
                ));
            }
            Some(buf.get_u16())
        };
        let header_len = start - buf.remaining();
        let payload_len = (fixed_header.remaining_length as usize)
            .checked_sub(header_len)
            .ok_or_else(|| {
                ProbeError::MalformedPacket("PUBLISH remaining length too short".to_string())
            })?;
        if buf.remaining() < payload_len {
            return Err(ProbeError::MalformedPacket("PUBLISH payload truncated".to_string()));
        }
        let payload = buf.copy_to_bytes(payload_len).to_vec();

        Ok(Self {
            topic_name,
            packet_id,
            payload,
            qos,
            retain: fixed_header.flags & publish_flags::RETAIN != 0,
            dup: fixed_header.flags & publish_flags::DUP != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_publish_qos1_flags_and_body() {
        let packet = PublishPacket::new("a/b", b"{\"message\":\"hello\"}".to_vec(), QoS::AtLeastOnce)
            .with_packet_id(10);
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf[0], 0x32);

        let header = FixedHeader::decode(&mut buf).unwrap();
        let decoded = PublishPacket::decode_body(&mut buf, &header).unwrap();
        assert_eq!(decoded, packet);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_publish_retain_dup() {
        let packet = PublishPacket::new("t", Vec::new(), QoS::AtLeastOnce)
            .with_packet_id(1)
            .with_retain(true)
            .with_dup(true);
        assert_eq!(packet.flags(), 0x0B);
    }

    #[test]
    fn test_qos0_has_no_packet_id() {
        let packet = PublishPacket::new("t", b"x".to_vec(), QoS::AtMostOnce).with_packet_id(5);
        assert_eq!(packet.packet_id, None);
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0x30, 0x04, 0x00, 0x01, b't', b'x']);
    }

    #[test]
    fn test_wildcard_topic_rejected() {
        let packet = PublishPacket::new("a/+", Vec::new(), QoS::AtMostOnce);
        let mut buf = BytesMut::new();
        assert!(matches!(
            packet.encode(&mut buf),
            Err(ProbeError::InvalidTopicName(_))
        ));
    }

    #[test]
    fn test_missing_packet_id_rejected() {
        let packet = PublishPacket::new("t", Vec::new(), QoS::AtLeastOnce);
        let mut buf = BytesMut::new();
        assert!(packet.encode(&mut buf).is_err());
    }
}
