//! Shared byte cursor over the module's output stream.
//!
//! The module interleaves three grammars on one serial line: CRLF-terminated
//! text lines, connection notifications (also lines), and `+IPD,<id>,<len>:`
//! frame headers that are followed directly by `len` payload bytes with no
//! line terminator. [`StreamCursor`] buffers raw bytes and lets the caller
//! pull either a complete line or a frame header off the front, so bytes
//! read past the end of one message stay available for the next.

use bytes::{Buf, BytesMut};

use crate::frame::{ConnectionId, FrameHeader};

/// Line terminator used in both directions.
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Literal prefix of a frame header.
pub const FRAME_HEADER_PREFIX: &[u8] = b"+IPD,";

/// Longest header text accepted between the prefix and the `:` delimiter.
pub const MAX_FRAME_HEADER_LEN: usize = 32;

/// Result of checking the front of the buffer for a frame header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderScan {
    /// The buffer does not start with a frame header.
    NotHeader,
    /// The buffer may start with a header but more bytes are needed.
    Incomplete,
    /// A header was parsed and consumed; payload bytes follow it.
    Header(FrameHeader),
    /// A header-shaped prefix was consumed but its fields did not parse.
    Malformed(String),
}

/// Byte buffer between the transport and the protocol decoders.
#[derive(Debug, Default)]
pub struct StreamCursor {
    /// Bytes read from the transport but not yet consumed.
    buffer: BytesMut,
}

impl StreamCursor {
    /// Create an empty cursor.
    pub fn new() -> Self {
        StreamCursor {
            buffer: BytesMut::with_capacity(1024),
        }
    }

    /// Append bytes received from the transport.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode one complete CRLF-terminated line.
    ///
    /// Lone carriage returns inside the line are dropped and trailing
    /// whitespace is trimmed. Returns `None` until a terminator arrives.
    pub fn decode_line(&mut self) -> Option<String> {
        let end = self
            .buffer
            .windows(LINE_TERMINATOR.len())
            .position(|w| w == LINE_TERMINATOR)?;

        let raw = self.buffer.split_to(end);
        self.buffer.advance(LINE_TERMINATOR.len());

        let mut bytes: Vec<u8> = raw.iter().copied().filter(|&b| b != b'\r').collect();
        while bytes.last().is_some_and(|b| b.is_ascii_whitespace()) {
            bytes.pop();
        }
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Check whether the buffer starts with a `+IPD,<id>,<len>:` header.
    ///
    /// On [`HeaderScan::Header`] and [`HeaderScan::Malformed`] the header
    /// bytes up to and including the delimiter are consumed. A CRLF before
    /// any `:` means the text is an ordinary line and is left in place.
    pub fn scan_frame_header(&mut self) -> HeaderScan {
        let prefix_len = FRAME_HEADER_PREFIX.len();
        if self.buffer.len() < prefix_len {
            if !self.buffer.is_empty() && FRAME_HEADER_PREFIX.starts_with(&self.buffer) {
                return HeaderScan::Incomplete;
            }
            return HeaderScan::NotHeader;
        }
        if !self.buffer.starts_with(FRAME_HEADER_PREFIX) {
            return HeaderScan::NotHeader;
        }

        let rest = &self.buffer[prefix_len..];
        let colon = rest.iter().position(|&b| b == b':');
        let newline = rest
            .windows(LINE_TERMINATOR.len())
            .position(|w| w == LINE_TERMINATOR);

        let colon = match (colon, newline) {
            (Some(c), Some(n)) if n < c => return HeaderScan::NotHeader,
            (None, Some(_)) => return HeaderScan::NotHeader,
            (Some(c), _) if c <= MAX_FRAME_HEADER_LEN => c,
            (None, None) if rest.len() <= MAX_FRAME_HEADER_LEN => return HeaderScan::Incomplete,
            _ => {
                self.buffer.advance(prefix_len);
                return HeaderScan::Malformed("header delimiter not found".to_string());
            }
        };

        let text = String::from_utf8_lossy(&rest[..colon]).into_owned();
        self.buffer.advance(prefix_len + colon + 1);

        match parse_header_fields(&text) {
            Some(header) => HeaderScan::Header(header),
            None => HeaderScan::Malformed(text),
        }
    }

    /// Remove up to `max` bytes from the front of the buffer.
    pub fn take(&mut self, max: usize) -> Vec<u8> {
        let n = max.min(self.buffer.len());
        self.buffer.split_to(n).to_vec()
    }

    /// Drop `prefix` from the front of the buffer if it is there.
    pub fn strip_prefix(&mut self, prefix: &[u8]) -> bool {
        if self.buffer.starts_with(prefix) {
            self.buffer.advance(prefix.len());
            true
        } else {
            false
        }
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Discard all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Get the current buffer contents as a string (for debugging).
    pub fn buffer_as_str(&self) -> String {
        String::from_utf8_lossy(&self.buffer).to_string()
    }

    /// Encode a command for transmission.
    ///
    /// Appends the CRLF terminator.
    pub fn encode_command(cmd: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(cmd.len() + LINE_TERMINATOR.len());
        buf.extend_from_slice(cmd.as_bytes());
        buf.extend_from_slice(LINE_TERMINATOR);
        buf
    }
}

/// Parse the `<id>,<length>` text between the prefix and the delimiter.
fn parse_header_fields(text: &str) -> Option<FrameHeader> {
    let (id, len) = text.split_once(',')?;
    let id: u8 = id.trim().parse().ok()?;
    let declared_len: usize = len.trim().parse().ok()?;
    Some(FrameHeader {
        id: ConnectionId(id),
        declared_len,
    })
}
