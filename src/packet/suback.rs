use crate::constants::SUBACK_FAILURE;
use crate::error::{ProbeError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::QoS;
use bytes::{Buf, BufMut};

/// MQTT SUBACK packet
///
/// Each return code is either the granted `QoS` (0..=2) or `0x80` for a
/// refused filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAckPacket {
    pub packet_id: u16,
    pub return_codes: Vec<u8>,
}

impl SubAckPacket {
    #[must_use]
    pub fn new(packet_id: u16, return_codes: Vec<u8>) -> Self {
        Self {
            packet_id,
            return_codes,
        }
    }

    /// Granted `QoS` per filter, `None` where the broker refused it
    #[must_use]
    pub fn granted(&self) -> Vec<Option<QoS>> {
        self.return_codes
            .iter()
            .map(|&code| match code {
                0..=2 => Some(QoS::from(code)),
                _ => None,
            })
            .collect()
    }
}

impl MqttPacket for SubAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::SubAck
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u16(self.packet_id);
        buf.put_slice(&self.return_codes);
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        let len = fixed_header.remaining_length as usize;
        if len < 3 || buf.remaining() < len {
            return Err(ProbeError::MalformedPacket(
                "SUBACK needs a packet identifier and at least one return code".to_string(),
            ));
        }
        let packet_id = buf.get_u16();
        let return_codes = buf.copy_to_bytes(len - 2).to_vec();
        if let Some(code) = return_codes
            .iter()
            .find(|&&c| c > 2 && c != SUBACK_FAILURE)
        {
            return Err(ProbeError::MalformedPacket(format!(
                "Invalid SUBACK return code {code:#04x}"
            )));
        }
        Ok(Self {
            packet_id,
            return_codes,
        })
    }
}
