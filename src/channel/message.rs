//! Message payloads carried over the channel.

use std::borrow::Cow;
use std::fmt;

/// A single message, already limited to the size of the channel it travelled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcMessage {
    bytes: Vec<u8>,
}

impl IpcMessage {
    /// Wrap raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Build a NUL-terminated message from text, cutting the text to at most `limit`
    /// bytes. The terminator keeps C peers that print the buffer as a string happy.
    pub fn from_text(text: &str, limit: usize) -> Self {
        let mut bytes = truncate_on_char_boundary(text, limit).as_bytes().to_vec();
        bytes.push(0);
        Self::new(bytes)
    }

    /// Build a NUL-terminated message from raw line bytes, cut to at most `limit`
    /// bytes. The bytes are forwarded as typed, whatever their encoding.
    pub fn from_line(line: &[u8], limit: usize) -> Self {
        let mut bytes = line[..line.len().min(limit)].to_vec();
        bytes.push(0);
        Self::new(bytes)
    }

    /// Raw payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Text view of the payload. Stops at the first NUL so buffers sent by C peers
    /// (terminator plus trailing garbage) read cleanly.
    pub fn text(&self) -> Cow<'_, str> {
        let end = self
            .bytes
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(self.bytes.len());
        String::from_utf8_lossy(&self.bytes[..end])
    }
}

impl fmt::Display for IpcMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text())
    }
}

impl From<&str> for IpcMessage {
    fn from(text: &str) -> Self {
        Self::new(text.as_bytes())
    }
}

impl From<String> for IpcMessage {
    fn from(text: String) -> Self {
        Self::new(text.into_bytes())
    }
}

/// Longest prefix of `text` that fits in `limit` bytes without splitting a character.
fn truncate_on_char_boundary(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_stops_at_nul() {
        let msg = IpcMessage::new(b"hello\0garbage".to_vec());
        assert_eq!(msg.text(), "hello");
        assert_eq!(msg.len(), 13);
    }

    #[test]
    fn test_from_text_truncates() {
        let msg = IpcMessage::from_text("abcdefgh", 5);
        assert_eq!(msg.as_bytes(), b"abcde\0");
        assert_eq!(msg.text(), "abcde");

        let short = IpcMessage::from_text("abc", 5);
        assert_eq!(short.as_bytes(), b"abc\0");
    }

    #[test]
    fn test_from_line_keeps_raw_bytes() {
        let msg = IpcMessage::from_line(b"caf\xe9 \xff", 80);
        assert_eq!(msg.as_bytes(), b"caf\xe9 \xff\0");

        let cut = IpcMessage::from_line(b"abcdefgh", 5);
        assert_eq!(cut.as_bytes(), b"abcde\0");
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        // "é" is two bytes; cutting at 2 must not split it.
        assert_eq!(truncate_on_char_boundary("aé", 2), "a");
        assert_eq!(truncate_on_char_boundary("aé", 3), "aé");
        assert_eq!(truncate_on_char_boundary("", 0), "");
    }

    #[test]
    fn test_display_uses_text() {
        let msg = IpcMessage::from("status ok");
        assert_eq!(msg.to_string(), "status ok");
        assert!(!msg.is_empty());
        assert!(IpcMessage::new(Vec::new()).is_empty());
    }
}
