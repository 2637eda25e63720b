use crate::encoding::{decode_string, encode_string};
use crate::error::{ProbeError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::QoS;
use bytes::{Buf, BufMut};

/// MQTT SUBSCRIBE packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribePacket {
    pub packet_id: u16,
    pub filters: Vec<(String, QoS)>,
}

impl SubscribePacket {
    #[must_use]
    pub fn new(packet_id: u16) -> Self {
        Self {
            packet_id,
            filters: Vec::new(),
        }
    }

    #[must_use]
    pub fn add_filter(mut self, filter: impl Into<String>, qos: QoS) -> Self {
        self.filters.push((filter.into(), qos));
        self
    }
}

impl MqttPacket for SubscribePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Subscribe
    }

    fn flags(&self) -> u8 {
        0x02
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.filters.is_empty() {
            return Err(ProbeError::ProtocolError(
                "SUBSCRIBE needs at least one topic filter".to_string(),
            ));
        }
        buf.put_u16(self.packet_id);
        for (filter, qos) in &self.filters {
            encode_string(buf, filter)?;
            buf.put_u8(u8::from(*qos));
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        if buf.remaining() < 2 {
            return Err(ProbeError::MalformedPacket(
                "SUBSCRIBE missing packet identifier".to_string(),
            ));
        }
        let packet_id = buf.get_u16();
        let mut consumed = 2usize;
        let mut filters = Vec::new();
        while consumed < fixed_header.remaining_length as usize {
            let before = buf.remaining();
            let filter = decode_string(buf)?;
            if !buf.has_remaining() {
                return Err(ProbeError::MalformedPacket(
                    "SUBSCRIBE filter missing requested QoS".to_string(),
                ));
            }
            let requested = buf.get_u8();
            if requested > 2 {
                return Err(ProbeError::MalformedPacket(format!(
                    "Invalid requested QoS {requested}"
                )));
            }
            filters.push((filter, QoS::from(requested)));
            consumed += before - buf.remaining();
        }
        if filters.is_empty() {
            return Err(ProbeError::ProtocolError(
                "SUBSCRIBE with no topic filters".to_string(),
            ));
        }
        Ok(Self { packet_id, filters })
    }
}
