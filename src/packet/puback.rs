use crate::error::{ProbeError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use bytes::{Buf, BufMut};

/// MQTT PUBACK packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubAckPacket {
    pub packet_id: u16,
}

impl PubAckPacket {
    #[must_use]
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }
}

impl MqttPacket for PubAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::PubAck
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u16(self.packet_id);
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, _fixed_header: &FixedHeader) -> Result<Self> {
        if buf.remaining() < 2 {
            return Err(ProbeError::MalformedPacket(
                "PUBACK missing packet identifier".to_string(),
            ));
        }
        Ok(Self {
            packet_id: buf.get_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_puback_bytes() {
        let mut buf = BytesMut::new();
        PubAckPacket::new(0x1234).encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0x40, 0x02, 0x12, 0x34]);
    }

    #[test]
    fn test_puback_truncated() {
        let mut buf = BytesMut::from(&[0x12u8][..]);
        let header = FixedHeader::new(PacketType::PubAck, 0, 1);
        assert!(PubAckPacket::decode_body(&mut buf, &header).is_err());
    }
}
