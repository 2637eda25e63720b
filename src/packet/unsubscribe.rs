use crate::encoding::{decode_string, encode_string};
use crate::error::{ProbeError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use bytes::{Buf, BufMut};

/// MQTT UNSUBSCRIBE packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribePacket {
    pub packet_id: u16,
    pub filters: Vec<String>,
}

impl UnsubscribePacket {
    #[must_use]
    pub fn new(packet_id: u16) -> Self {
        Self {
            packet_id,
            filters: Vec::new(),
        }
    }

    #[must_use]
    pub fn add_filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }
}

impl MqttPacket for UnsubscribePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Unsubscribe
    }

    fn flags(&self) -> u8 {
        0x02
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.filters.is_empty() {
            return Err(ProbeError::ProtocolError(
                "UNSUBSCRIBE needs at least one topic filter".to_string(),
            ));
        }
        buf.put_u16(self.packet_id);
        for filter in &self.filters {
            encode_string(buf, filter)?;
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        if buf.remaining() < 2 {
            return Err(ProbeError::MalformedPacket(
                "UNSUBSCRIBE missing packet identifier".to_string(),
            ));
        }
        let packet_id = buf.get_u16();
        let mut consumed = 2usize;
        let mut filters = Vec::new();
        while consumed < fixed_header.remaining_length as usize {
            let before = buf.remaining();
            filters.push(decode_string(buf)?);
            consumed += before - buf.remaining();
        }
        if filters.is_empty() {
            return Err(ProbeError::ProtocolError(
                "UNSUBSCRIBE with no topic filters".to_string(),
            ));
        }
        Ok(Self { packet_id, filters })
    }
}
