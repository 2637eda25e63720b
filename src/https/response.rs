use crate::constants::HTTP_OK_MARKER;

const CONTENT_LENGTH: &[u8] = b"content-length:";

/// Incremental scanner for a non-chunked HTTP response
///
/// Feed it everything received so far after every read. It resumes at the
/// first line it has not finished, so a response may arrive split at any
/// byte. Only a lower-case `content-length:` header is recognised and
/// chunked transfer encoding is not supported.
#[derive(Debug, Clone, Default)]
pub struct ResponseScanner {
    line_start: usize,
    lines: usize,
    status_ok: bool,
    content_length: Option<usize>,
    expected_end: Option<usize>,
}

impl ResponseScanner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans the complete lines of `received` not looked at yet
    pub fn scan(&mut self, received: &[u8]) {
        while self.expected_end.is_none() {
            let Some(rest) = received.get(self.line_start..) else {
                return;
            };
            let Some(line_len) = rest.windows(2).position(|w| w == b"\r\n") else {
                return;
            };
            let line = &rest[..line_len];
            if self.lines == 0 {
                self.status_ok = contains(line, HTTP_OK_MARKER.as_bytes());
            } else if line.is_empty() {
                self.expected_end = Some(self.line_start + 2 + self.content_length.unwrap_or(0));
            } else if self.content_length.is_none() {
                self.content_length = parse_content_length(line);
            }
            self.lines += 1;
            self.line_start += line_len + 2;
        }
    }

    /// Whether the status line carried the success marker
    #[must_use]
    pub fn status_ok(&self) -> bool {
        self.status_ok
    }

    #[must_use]
    pub fn content_length(&self) -> Option<usize> {
        self.content_length
    }

    /// Total response length, known once the header block has ended
    #[must_use]
    pub fn expected_end(&self) -> Option<usize> {
        self.expected_end
    }

    /// Offset of the first body byte, known once the header block has ended
    #[must_use]
    pub fn body_start(&self) -> Option<usize> {
        self.expected_end.map(|_| self.line_start)
    }

    #[must_use]
    pub fn is_complete(&self, received: usize) -> bool {
        self.expected_end.is_some_and(|end| received >= end)
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn parse_content_length(line: &[u8]) -> Option<usize> {
    let value = line.strip_prefix(CONTENT_LENGTH)?;
    let value = std::str::from_utf8(value).ok()?.trim_start();
    let digits = value
        .find(|c: char| !c.is_ascii_digit())
        .map_or(value, |end| &value[..end]);
    digits.parse().ok()
}
