use crate::config::HttpMethod;
use crate::error::Result;
use crate::scratch::ScratchLease;

/// Writes a complete HTTP/1.1 request with a `Content-Length` body
///
/// # Errors
///
/// Returns `ProbeError::BufferOverflow` if the request does not fit the
/// lease; the lease keeps its previous content in that case
pub fn encode_request(
    lease: &mut ScratchLease<'_>,
    method: HttpMethod,
    path: &str,
    host: &str,
    body: &str,
) -> Result<()> {
    lease.write_args(format_args!(
        "{method} {path} HTTP/1.1\r\nHost: {host}\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use crate::scratch::ScratchBuffer;

    #[test]
    fn test_post_with_body() {
        let mut scratch = ScratchBuffer::new(600).unwrap();
        let mut lease = scratch.lease();
        encode_request(
            &mut lease,
            HttpMethod::Post,
            "/topics/Nuvoton/Mbed/D001?qos=1",
            "iot.example.com",
            r#"{"message":"hi"}"#,
        )
        .unwrap();
        assert_eq!(
            lease.as_bytes(),
            b"POST /topics/Nuvoton/Mbed/D001?qos=1 HTTP/1.1\r\nHost: iot.example.com\r\nContent-Length: 16\r\n\r\n{\"message\":\"hi\"}"
        );
    }

    #[test]
    fn test_get_without_body() {
        let mut scratch = ScratchBuffer::new(600).unwrap();
        let mut lease = scratch.lease();
        encode_request(&mut lease, HttpMethod::Get, "/things/D001/shadow", "h", "").unwrap();
        assert_eq!(
            lease.as_bytes(),
            b"GET /things/D001/shadow HTTP/1.1\r\nHost: h\r\nContent-Length: 0\r\n\r\n"
        );
    }

    #[test]
    fn test_request_too_large() {
        let mut scratch = ScratchBuffer::new(64).unwrap();
        let mut lease = scratch.lease();
        let body = "x".repeat(64);
        let err = encode_request(&mut lease, HttpMethod::Post, "/", "h", &body).unwrap_err();
        assert!(matches!(err, ProbeError::BufferOverflow { capacity: 63, .. }));
        assert!(lease.is_empty());
    }
}
