//! Page content and response assembly.

use chrono::{DateTime, Local, TimeZone};

/// Status line and headers sent before every body.
pub const RESPONSE_HEAD: &str = "HTTP/1.0 200 OK\r\nContent-Type: text/plain\r\n\r\n";

/// Render the body for `path` at `now`.
///
/// Every path gets the same page: the time as a single line in the classic
/// `Wed Oct 14 09:03:07 2026` layout.
pub fn render_body<Tz: TimeZone>(_path: &str, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{}\n", now.format("%a %b %e %H:%M:%S %Y"))
}

/// Build the full response for `path` using the local clock.
pub fn respond(path: &str) -> Vec<u8> {
    build_response(&render_body(path, &Local::now()))
}

/// Join the response head and `body`.
pub fn build_response(body: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(RESPONSE_HEAD.len() + body.len());
    out.extend_from_slice(RESPONSE_HEAD.as_bytes());
    out.extend_from_slice(body.as_bytes());
    out
}
