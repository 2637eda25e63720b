//! MQTT 3.1.1 control packets
//!
//! Only the packets a QoS 0/1 client session exchanges are modelled. QoS 2
//! flow packets are recognised in the fixed header so that a broker sending
//! one produces a protocol error instead of a framing error.

pub mod connack;
pub mod connect;
pub mod puback;
pub mod publish;
pub mod suback;
pub mod subscribe;
pub mod unsuback;
pub mod unsubscribe;

use crate::constants::masks;
use crate::encoding::{
    decode_remaining_length, encode_remaining_length, peek_remaining_length,
    remaining_length_len,
};
use crate::error::{ProbeError, Result};
use bytes::{Buf, BufMut, BytesMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl PacketType {
    /// Converts a u8 to `PacketType`
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Connect),
            2 => Some(Self::ConnAck),
            3 => Some(Self::Publish),
            4 => Some(Self::PubAck),
            5 => Some(Self::PubRec),
            6 => Some(Self::PubRel),
            7 => Some(Self::PubComp),
            8 => Some(Self::Subscribe),
            9 => Some(Self::SubAck),
            10 => Some(Self::Unsubscribe),
            11 => Some(Self::UnsubAck),
            12 => Some(Self::PingReq),
            13 => Some(Self::PingResp),
            14 => Some(Self::Disconnect),
            _ => None,
        }
    }
}

impl From<PacketType> for u8 {
    fn from(packet_type: PacketType) -> Self {
        packet_type as u8
    }
}

/// MQTT packet fixed header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub packet_type: PacketType,
    pub flags: u8,
    pub remaining_length: u32,
}

impl FixedHeader {
    #[must_use]
    pub fn new(packet_type: PacketType, flags: u8, remaining_length: u32) -> Self {
        Self {
            packet_type,
            flags,
            remaining_length,
        }
    }

    /// Encodes the fixed header
    ///
    /// # Errors
    ///
    /// Returns an error if the remaining length is too large
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u8((u8::from(self.packet_type) << 4) | (self.flags & masks::FLAGS));
        encode_remaining_length(buf, self.remaining_length)
    }

    /// Decodes a fixed header from the buffer
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is empty, the packet type is reserved,
    /// or the remaining length is malformed
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if !buf.has_remaining() {
            return Err(ProbeError::MalformedPacket(
                "No data for fixed header".to_string(),
            ));
        }
        let byte1 = buf.get_u8();
        let type_value = (byte1 & masks::PACKET_TYPE) >> 4;
        let packet_type = PacketType::from_u8(type_value).ok_or_else(|| {
            ProbeError::MalformedPacket(format!("Invalid packet type: {type_value}"))
        })?;
        let remaining_length = decode_remaining_length(buf)?;
        Ok(Self {
            packet_type,
            flags: byte1 & masks::FLAGS,
            remaining_length,
        })
    }

    /// Checks the reserved flag bits for the packet type
    #[must_use]
    pub fn validate_flags(&self) -> bool {
        match self.packet_type {
            PacketType::Publish => true,
            PacketType::PubRel | PacketType::Subscribe | PacketType::Unsubscribe => {
                self.flags == 0x02
            }
            _ => self.flags == 0,
        }
    }

    #[must_use]
    pub fn encoded_len(&self) -> usize {
        1 + remaining_length_len(self.remaining_length)
    }
}

/// Trait for MQTT packets with a body
pub trait MqttPacket: Sized {
    fn packet_type(&self) -> PacketType;

    /// Returns the fixed header flags
    fn flags(&self) -> u8 {
        0
    }

    /// Encodes the packet body (without fixed header)
    ///
    /// # Errors
    ///
    /// Returns an error if a field cannot be represented on the wire
    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()>;

    /// Decodes the packet body (without fixed header)
    ///
    /// # Errors
    ///
    /// Returns an error if the body is malformed
    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self>;

    /// Encodes the complete packet (with fixed header)
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        let mut body = Vec::new();
        self.encode_body(&mut body)?;
        let remaining_length = u32::try_from(body.len())
            .map_err(|_| ProbeError::ProtocolError("Packet body too large".to_string()))?;
        FixedHeader::new(self.packet_type(), self.flags(), remaining_length).encode(buf)?;
        buf.put_slice(&body);
        Ok(())
    }
}

/// The packets a client session sends or receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Box<connect::ConnectPacket>),
    ConnAck(connack::ConnAckPacket),
    Publish(publish::PublishPacket),
    PubAck(puback::PubAckPacket),
    Subscribe(subscribe::SubscribePacket),
    SubAck(suback::SubAckPacket),
    Unsubscribe(unsubscribe::UnsubscribePacket),
    UnsubAck(unsuback::UnsubAckPacket),
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::ConnAck(_) => PacketType::ConnAck,
            Packet::Publish(_) => PacketType::Publish,
            Packet::PubAck(_) => PacketType::PubAck,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::SubAck(_) => PacketType::SubAck,
            Packet::Unsubscribe(_) => PacketType::Unsubscribe,
            Packet::UnsubAck(_) => PacketType::UnsubAck,
            Packet::PingReq => PacketType::PingReq,
            Packet::PingResp => PacketType::PingResp,
            Packet::Disconnect => PacketType::Disconnect,
        }
    }

    /// Encodes the packet with its fixed header
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        match self {
            Packet::Connect(p) => p.encode(buf),
            Packet::ConnAck(p) => p.encode(buf),
            Packet::Publish(p) => p.encode(buf),
            Packet::PubAck(p) => p.encode(buf),
            Packet::Subscribe(p) => p.encode(buf),
            Packet::SubAck(p) => p.encode(buf),
            Packet::Unsubscribe(p) => p.encode(buf),
            Packet::UnsubAck(p) => p.encode(buf),
            Packet::PingReq | Packet::PingResp | Packet::Disconnect => {
                FixedHeader::new(self.packet_type(), 0, 0).encode(buf)
            }
        }
    }

    /// Decodes a packet body based on the fixed header
    ///
    /// # Errors
    ///
    /// Returns an error if the body is malformed or the packet belongs to the
    /// unsupported QoS 2 flow
    pub fn decode_from_body<B: Buf>(fixed_header: &FixedHeader, buf: &mut B) -> Result<Self> {
        if !fixed_header.validate_flags() {
            return Err(ProbeError::MalformedPacket(format!(
                "Invalid flags {:#04x} for {:?}",
                fixed_header.flags, fixed_header.packet_type
            )));
        }
        match fixed_header.packet_type {
            PacketType::Connect => Ok(Packet::Connect(Box::new(
                connect::ConnectPacket::decode_body(buf, fixed_header)?,
            ))),
            PacketType::ConnAck => Ok(Packet::ConnAck(connack::ConnAckPacket::decode_body(
                buf,
                fixed_header,
            )?)),
            PacketType::Publish => Ok(Packet::Publish(publish::PublishPacket::decode_body(
                buf,
                fixed_header,
            )?)),
            PacketType::PubAck => Ok(Packet::PubAck(puback::PubAckPacket::decode_body(
                buf,
                fixed_header,
            )?)),
            PacketType::Subscribe => Ok(Packet::Subscribe(
                subscribe::SubscribePacket::decode_body(buf, fixed_header)?,
            )),
            PacketType::SubAck => Ok(Packet::SubAck(suback::SubAckPacket::decode_body(
                buf,
                fixed_header,
            )?)),
            PacketType::Unsubscribe => Ok(Packet::Unsubscribe(
                unsubscribe::UnsubscribePacket::decode_body(buf, fixed_header)?,
            )),
            PacketType::UnsubAck => Ok(Packet::UnsubAck(unsuback::UnsubAckPacket::decode_body(
                buf,
                fixed_header,
            )?)),
            PacketType::PingReq => Ok(Packet::PingReq),
            PacketType::PingResp => Ok(Packet::PingResp),
            PacketType::Disconnect => Ok(Packet::Disconnect),
            PacketType::PubRec | PacketType::PubRel | PacketType::PubComp => {
                Err(ProbeError::ProtocolError(format!(
                    "{:?} belongs to the QoS 2 flow, which this session never requests",
                    fixed_header.packet_type
                )))
            }
        }
    }

    /// Total length of the frame starting at `buf[0]`, once its fixed header is readable
    ///
    /// # Errors
    ///
    /// Returns an error if the remaining length is longer than four bytes
    pub fn frame_len(buf: &[u8]) -> Result<Option<usize>> {
        if buf.is_empty() {
            return Ok(None);
        }
        Ok(peek_remaining_length(&buf[1..])?
            .map(|(remaining_length, length_len)| 1 + length_len + remaining_length as usize))
    }

    /// Splits one complete packet off the front of `buf`
    ///
    /// Returns `Ok(None)` and leaves `buf` untouched while the packet is still
    /// incomplete.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is malformed, the packet exceeds
    /// `max_packet_size`, or the body fails to decode
    pub fn try_decode(buf: &mut BytesMut, max_packet_size: usize) -> Result<Option<Self>> {
        let Some(total) = Self::frame_len(buf)? else {
            return Ok(None);
        };
        if total > max_packet_size {
            return Err(ProbeError::MalformedPacket(format!(
                "Packet of {total} bytes exceeds maximum {max_packet_size}"
            )));
        }
        if buf.len() < total {
            return Ok(None);
        }

        let mut frame = buf.split_to(total).freeze();
        let fixed_header = FixedHeader::decode(&mut frame)?;
        let packet = Self::decode_from_body(&fixed_header, &mut frame)?;
        if frame.has_remaining() {
            return Err(ProbeError::MalformedPacket(format!(
                "{} trailing bytes after {:?}",
                frame.remaining(),
                fixed_header.packet_type
            )));
        }
        Ok(Some(packet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::publish::PublishPacket;
    use crate::QoS;
    use proptest::prelude::*;

    #[test]
    fn test_packet_type_from_u8() {
        assert_eq!(PacketType::from_u8(1), Some(PacketType::Connect));
        assert_eq!(PacketType::from_u8(14), Some(PacketType::Disconnect));
        assert_eq!(PacketType::from_u8(0), None);
        assert_eq!(PacketType::from_u8(15), None);
    }

    #[test]
    fn test_fixed_header_flags() {
        let mut buf = BytesMut::new();
        FixedHeader::new(PacketType::Publish, 0x0B, 50)
            .encode(&mut buf)
            .unwrap();
        let decoded = FixedHeader::decode(&mut buf).unwrap();
        assert_eq!(decoded.packet_type, PacketType::Publish);
        assert_eq!(decoded.flags, 0x0B);
        assert_eq!(decoded.remaining_length, 50);
    }

    #[test]
    fn test_validate_flags() {
        assert!(FixedHeader::new(PacketType::Subscribe, 0x02, 0).validate_flags());
        assert!(!FixedHeader::new(PacketType::Subscribe, 0x00, 0).validate_flags());
        assert!(!FixedHeader::new(PacketType::ConnAck, 0x01, 0).validate_flags());
    }

    #[test]
    fn test_unit_packets() {
        for (packet, byte) in [
            (Packet::PingReq, 0xC0u8),
            (Packet::PingResp, 0xD0),
            (Packet::Disconnect, 0xE0),
        ] {
            let mut buf = BytesMut::new();
            packet.encode(&mut buf).unwrap();
            assert_eq!(&buf[..], &[byte, 0x00]);
            assert_eq!(Packet::try_decode(&mut buf, 1000).unwrap(), Some(packet));
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_try_decode_waits_for_full_frame() {
        let mut full = BytesMut::new();
        Packet::PubAck(puback::PubAckPacket::new(7))
            .encode(&mut full)
            .unwrap();

        let mut partial = BytesMut::from(&full[..3]);
        assert_eq!(Packet::try_decode(&mut partial, 1000).unwrap(), None);
        assert_eq!(partial.len(), 3);

        partial.extend_from_slice(&full[3..]);
        assert_eq!(
            Packet::try_decode(&mut partial, 1000).unwrap(),
            Some(Packet::PubAck(puback::PubAckPacket::new(7)))
        );
    }

    #[test]
    fn test_try_decode_rejects_oversized() {
        let mut buf = BytesMut::new();
        PublishPacket::new("t", vec![0u8; 2000], QoS::AtMostOnce)
            .encode(&mut buf)
            .unwrap();
        assert!(Packet::try_decode(&mut buf, 1000).is_err());
    }

    #[test]
    fn test_frame_len_from_header_only() {
        let mut buf = BytesMut::new();
        PublishPacket::new("t", vec![0u8; 2000], QoS::AtMostOnce)
            .encode(&mut buf)
            .unwrap();
        assert_eq!(buf.len(), 2006);
        assert_eq!(Packet::frame_len(&buf[..3]).unwrap(), Some(2006));
        assert_eq!(Packet::frame_len(&buf[..2]).unwrap(), None);
        assert_eq!(Packet::frame_len(&[]).unwrap(), None);
    }

    #[test]
    fn test_qos2_flow_rejected() {
        let mut buf = BytesMut::from(&[0x50u8, 0x02, 0x00, 0x01][..]);
        assert!(matches!(
            Packet::try_decode(&mut buf, 1000),
            Err(ProbeError::ProtocolError(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_back_to_back_frames_split_anywhere(split in 0usize..64) {
            let mut wire = BytesMut::new();
            let first = Packet::Publish(PublishPacket::new("a/b", b"one".to_vec(), QoS::AtLeastOnce).with_packet_id(1));
            let second = Packet::UnsubAck(unsuback::UnsubAckPacket::new(9));
            first.encode(&mut wire).unwrap();
            second.encode(&mut wire).unwrap();
            let split = split.min(wire.len());

            let mut buf = BytesMut::from(&wire[..split]);
            let mut decoded = Vec::new();
            while let Some(p) = Packet::try_decode(&mut buf, 1000).unwrap() {
                decoded.push(p);
            }
            buf.extend_from_slice(&wire[split..]);
            while let Some(p) = Packet::try_decode(&mut buf, 1000).unwrap() {
                decoded.push(p);
            }
            prop_assert_eq!(decoded, vec![first, second]);
            prop_assert!(buf.is_empty());
        }
    }
}
