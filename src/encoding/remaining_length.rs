use crate::error::{ProbeError, Result};
use bytes::{Buf, BufMut};

/// Largest value the four-byte remaining length field can carry (268,435,455)
pub const REMAINING_LENGTH_MAX: u32 = 268_435_455;

/// Writes the fixed-header remaining length, seven bits per byte
///
/// # Errors
///
/// Returns `ProbeError::ProtocolError` if the value exceeds [`REMAINING_LENGTH_MAX`]
pub fn encode_remaining_length<B: BufMut>(buf: &mut B, value: u32) -> Result<()> {
    if value > REMAINING_LENGTH_MAX {
        return Err(ProbeError::ProtocolError(format!(
            "Remaining length {value} exceeds maximum {REMAINING_LENGTH_MAX}"
        )));
    }

    let mut rest = value;
    loop {
        #[allow(clippy::cast_possible_truncation)]
        let mut byte = (rest & 0x7F) as u8;
        rest >>= 7;
        if rest > 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if rest == 0 {
            return Ok(());
        }
    }
}

/// Reads a remaining length field, consuming its bytes
///
/// # Errors
///
/// Returns `ProbeError::MalformedPacket` if the buffer ends inside the field or
/// the field runs past four bytes
pub fn decode_remaining_length<B: Buf>(buf: &mut B) -> Result<u32> {
    let mut value = 0u32;
    for shift in [0u32, 7, 14, 21] {
        if !buf.has_remaining() {
            return Err(ProbeError::MalformedPacket(
                "Insufficient bytes for remaining length".to_string(),
            ));
        }
        let byte = buf.get_u8();
        value |= u32::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(ProbeError::MalformedPacket(
        "Remaining length exceeds 4 bytes".to_string(),
    ))
}

/// Inspects a remaining length field without consuming it
///
/// Returns `Ok(None)` when `bytes` ends before the field is complete, otherwise
/// the decoded value together with the number of bytes the field occupies.
///
/// # Errors
///
/// Returns `ProbeError::MalformedPacket` if the field runs past four bytes
pub fn peek_remaining_length(bytes: &[u8]) -> Result<Option<(u32, usize)>> {
    let mut value = 0u32;
    for (index, byte) in bytes.iter().take(4).enumerate() {
        value |= u32::from(byte & 0x7F) << (7 * index);
        if byte & 0x80 == 0 {
            return Ok(Some((value, index + 1)));
        }
    }
    if bytes.len() >= 4 {
        return Err(ProbeError::MalformedPacket(
            "Remaining length exceeds 4 bytes".to_string(),
        ));
    }
    Ok(None)
}

/// Number of bytes [`encode_remaining_length`] writes for `value`
#[must_use]
pub fn remaining_length_len(value: u32) -> usize {
    match value {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_boundary_widths() {
        let mut buf = BytesMut::new();
        for (value, width) in [
            (0, 1),
            (127, 1),
            (128, 2),
            (16_383, 2),
            (16_384, 3),
            (2_097_151, 3),
            (2_097_152, 4),
            (REMAINING_LENGTH_MAX, 4),
        ] {
            buf.clear();
            encode_remaining_length(&mut buf, value).unwrap();
            assert_eq!(buf.len(), width, "width of {value}");
            assert_eq!(remaining_length_len(value), width);
            assert_eq!(decode_remaining_length(&mut buf).unwrap(), value);
        }
    }

    #[test]
    fn test_reference_encodings() {
        let mut buf = BytesMut::new();
        encode_remaining_length(&mut buf, 64).unwrap();
        assert_eq!(&buf[..], &[0x40]);

        buf.clear();
        encode_remaining_length(&mut buf, 321).unwrap();
        assert_eq!(&buf[..], &[0xC1, 0x02]);
    }

    #[test]
    fn test_value_too_large() {
        let mut buf = BytesMut::new();
        assert!(encode_remaining_length(&mut buf, REMAINING_LENGTH_MAX + 1).is_err());
    }

    #[test]
    fn test_decode_truncated() {
        let mut buf = BytesMut::from(&[0x80u8][..]);
        assert!(decode_remaining_length(&mut buf).is_err());
    }

    #[test]
    fn test_decode_five_bytes() {
        let mut buf = BytesMut::from(&[0x80u8, 0x80, 0x80, 0x80, 0x01][..]);
        assert!(decode_remaining_length(&mut buf).is_err());
    }

    #[test]
    fn test_peek() {
        assert_eq!(peek_remaining_length(&[]).unwrap(), None);
        assert_eq!(peek_remaining_length(&[0xC1]).unwrap(), None);
        assert_eq!(peek_remaining_length(&[0xC1, 0x02, 0xFF]).unwrap(), Some((321, 2)));
        assert!(peek_remaining_length(&[0xFF, 0xFF, 0xFF, 0xFF]).is_err());
    }
}
