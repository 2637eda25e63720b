use crate::constants::limits::MAX_STRING_LENGTH;
use crate::error::{ProbeError, Result};
use bytes::{Buf, BufMut};

/// Writes a length-prefixed UTF-8 string
///
/// # Errors
///
/// Returns an error if the string contains a null character or is longer
/// than 65535 bytes
pub fn encode_string<B: BufMut>(buf: &mut B, string: &str) -> Result<()> {
    if string.contains('\0') {
        return Err(ProbeError::MalformedPacket(
            "String contains null character".to_string(),
        ));
    }
    let len = u16::try_from(string.len()).map_err(|_| {
        ProbeError::MalformedPacket(format!(
            "String length {} exceeds maximum {MAX_STRING_LENGTH}",
            string.len()
        ))
    })?;
    buf.put_u16(len);
    buf.put_slice(string.as_bytes());
    Ok(())
}

/// Reads a length-prefixed UTF-8 string
///
/// # Errors
///
/// Returns an error if the buffer is short, the bytes are not UTF-8, or the
/// string contains a null character
pub fn decode_string<B: Buf>(buf: &mut B) -> Result<String> {
    if buf.remaining() < 2 {
        return Err(ProbeError::MalformedPacket(
            "Insufficient bytes for string length".to_string(),
        ));
    }
    let len = usize::from(buf.get_u16());
    if buf.remaining() < len {
        return Err(ProbeError::MalformedPacket(format!(
            "Insufficient bytes for string data: expected {len}, got {}",
            buf.remaining()
        )));
    }
    let bytes = buf.copy_to_bytes(len);
    let string = std::str::from_utf8(&bytes)
        .map_err(|e| ProbeError::MalformedPacket(format!("Invalid UTF-8: {e}")))?;
    if string.contains('\0') {
        return Err(ProbeError::MalformedPacket(
            "String contains null character".to_string(),
        ));
    }
    Ok(string.to_owned())
}

#[must_use]
pub fn string_len(string: &str) -> usize {
    2 + string.len()
}
