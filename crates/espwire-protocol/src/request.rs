//! Request head parsing for delivered payloads.
//!
//! Only the header block is split out; body bytes after it are left for the
//! caller, located through [`RequestHead::consumed`].

/// Header lines of a request and where the header block ended.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestHead {
    /// Non-empty header lines in order, the request line first.
    pub lines: Vec<String>,
    /// Offset of the first byte after the header block.
    pub consumed: usize,
}

impl RequestHead {
    /// Get the request line, if any.
    pub fn request_line(&self) -> Option<RequestLine> {
        self.lines.first().and_then(|line| RequestLine::parse(line))
    }
}

/// Split `bytes` into header lines up to the first empty line.
///
/// Lines end at `\r\n`, `\r` or `\n`. Parsing stops after the first empty
/// line or at the end of input, whichever comes first.
pub fn parse_head(bytes: &[u8]) -> RequestHead {
    let mut head = RequestHead::default();
    let mut pos = 0;

    while pos < bytes.len() {
        let rest = &bytes[pos..];
        let (line_len, term_len) = match rest.iter().position(|&b| b == b'\r' || b == b'\n') {
            Some(i) if rest[i] == b'\r' && rest.get(i + 1) == Some(&b'\n') => (i, 2),
            Some(i) => (i, 1),
            None => (rest.len(), 0),
        };

        pos += line_len + term_len;
        if line_len == 0 {
            break;
        }
        head.lines
            .push(String::from_utf8_lossy(&rest[..line_len]).into_owned());
    }

    head.consumed = pos;
    head
}

/// First line of an HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    /// Method token, e.g. `GET`.
    pub method: String,
    /// Request target, e.g. `/index.html`.
    pub path: String,
    /// Protocol version, if given.
    pub version: Option<String>,
}

impl RequestLine {
    /// Parse `METHOD SP target [SP version]`.
    pub fn parse(line: &str) -> Option<RequestLine> {
        let mut parts = line.split_whitespace();
        let method = parts.next()?;
        let path = parts.next()?;
        Some(RequestLine {
            method: method.to_string(),
            path: path.to_string(),
            version: parts.next().map(str::to_string),
        })
    }

    /// Check if this is a `GET` request.
    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }
}
