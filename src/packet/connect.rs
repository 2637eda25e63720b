use crate::constants::connect::{CLEAN_SESSION_FLAG, PROTOCOL_LEVEL_V311, PROTOCOL_NAME};
use crate::encoding::{decode_string, encode_string};
use crate::error::{ProbeError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use bytes::{Buf, BufMut};

const USERNAME_FLAG: u8 = 0x80;
const PASSWORD_FLAG: u8 = 0x40;
const WILL_FLAGS: u8 = 0x3C;

/// MQTT 3.1.1 CONNECT packet
///
/// The protocol level is always 4. Will messages are not supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    pub protocol_level: u8,
    pub clean_session: bool,
    pub keep_alive: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
}

impl ConnectPacket {
    #[must_use]
    pub fn new(client_id: impl Into<String>, keep_alive: u16) -> Self {
        Self {
            protocol_level: PROTOCOL_LEVEL_V311,
            clean_session: true,
            keep_alive,
            client_id: client_id.into(),
            username: None,
            password: None,
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: Option<Vec<u8>>) -> Self {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    fn connect_flags(&self) -> u8 {
        let mut flags = 0;
        if self.clean_session {
            flags |= CLEAN_SESSION_FLAG;
        }
        if self.username.is_some() {
            flags |= USERNAME_FLAG;
        }
        if self.password.is_some() {
            flags |= PASSWORD_FLAG;
        }
        flags
    }
}

impl MqttPacket for ConnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Connect
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.password.is_some() && self.username.is_none() {
            return Err(ProbeError::ProtocolError(
                "Password requires a username in MQTT 3.1.1".to_string(),
            ));
        }
        encode_string(buf, PROTOCOL_NAME)?;
        buf.put_u8(self.protocol_level);
        buf.put_u8(self.connect_flags());
        buf.put_u16(self.keep_alive);

        encode_string(buf, &self.client_id)?;
        if let Some(username) = &self.username {
            encode_string(buf, username)?;
        }
        if let Some(password) = &self.password {
            let len = u16::try_from(password.len()).map_err(|_| {
                ProbeError::ProtocolError("Password longer than 65535 bytes".to_string())
            })?;
            buf.put_u16(len);
            buf.put_slice(password);
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, _fixed_header: &FixedHeader) -> Result<Self> {
        let protocol_name = decode_string(buf)?;
        if protocol_name != PROTOCOL_NAME {
            return Err(ProbeError::ProtocolError(format!(
                "Unexpected protocol name: {protocol_name}"
            )));
        }
        if buf.remaining() < 4 {
            return Err(ProbeError::MalformedPacket(
                "CONNECT variable header truncated".to_string(),
            ));
        }
        let protocol_level = buf.get_u8();
        let flags = buf.get_u8();
        if flags & 0x01 != 0 {
            return Err(ProbeError::MalformedPacket(
                "Reserved CONNECT flag set".to_string(),
            ));
        }
        if flags & WILL_FLAGS != 0 {
            return Err(ProbeError::ProtocolError(
                "Will messages are not supported".to_string(),
            ));
        }
        let keep_alive = buf.get_u16();
        let client_id = decode_string(buf)?;
        let username = if flags & USERNAME_FLAG != 0 {
            Some(decode_string(buf)?)
        } else {
            None
        };
        let password = if flags & PASSWORD_FLAG != 0 {
            if buf.remaining() < 2 {
                return Err(ProbeError::MalformedPacket(
                    "Password length missing".to_string(),
                ));
            }
            let len = usize::from(buf.get_u16());
            if buf.remaining() < len {
                return Err(ProbeError::MalformedPacket("Password truncated".to_string()));
            }
            Some(buf.copy_to_bytes(len).to_vec())
        } else {
            None
        };

        Ok(Self {
            protocol_level,
            clean_session: flags & CLEAN_SESSION_FLAG != 0,
            keep_alive,
            client_id,
            username,
            password,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_connect_wire_layout() {
        let packet = ConnectPacket::new("ABCDEF01-00000002-0000000A", 60);
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        assert_eq!(buf[0], 0x10);
        // protocol name "MQTT", level 4, clean session, keep alive 60
        assert_eq!(&buf[2..8], &[0x00, 0x04, b'M', b'Q', b'T', b'T']);
        assert_eq!(buf[8], 4);
        assert_eq!(buf[9], CLEAN_SESSION_FLAG);
        assert_eq!(&buf[10..12], &[0x00, 60]);

        let header = FixedHeader::decode(&mut buf).unwrap();
        let decoded = ConnectPacket::decode_body(&mut buf, &header).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_connect_with_credentials() {
        let packet = ConnectPacket::new("dev", 30).with_credentials("user", Some(b"pw".to_vec()));
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        let header = FixedHeader::decode(&mut buf).unwrap();
        let decoded = ConnectPacket::decode_body(&mut buf, &header).unwrap();
        assert_eq!(decoded.username.as_deref(), Some("user"));
        assert_eq!(decoded.password.as_deref(), Some(&b"pw"[..]));
    }

    #[test]
    fn test_password_without_username_rejected() {
        let mut packet = ConnectPacket::new("dev", 30);
        packet.password = Some(b"pw".to_vec());
        let mut buf = BytesMut::new();
        assert!(packet.encode(&mut buf).is_err());
    }
}
