//! Connection and frame extraction.
//!
//! Inbound data arrives as a connection notification line followed by a
//! frame header and an exact-length payload:
//!
//! ```text
//! 0,CONNECT\r\n
//! \r\n
//! +IPD,0,18:GET / HTTP/1.1\r\n...
//! ```
//!
//! The header carries no trailing terminator; the payload starts right after
//! the `:`.

use std::fmt;
use std::io;
use std::time::Duration;

use log::{debug, warn};

use crate::error::{AtError, AtResult};
use crate::receiver::{Flow, PumpEnd, StreamHandler, StreamReader};
use crate::responses::Notification;
use crate::transport::{Clock, Transport};

/// Connection slot number reported by the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u8);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parsed `+IPD,<id>,<len>:` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Connection the payload belongs to.
    pub id: ConnectionId,
    /// Payload length as declared by the module.
    pub declared_len: usize,
}

/// A payload delivered on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Connection the payload arrived on.
    pub id: ConnectionId,
    /// Payload bytes.
    pub payload: Vec<u8>,
}

/// Tracks the open connection while waiting for a matching header.
#[derive(Debug, Default)]
struct AcceptTracker {
    open: Option<ConnectionId>,
    header: Option<FrameHeader>,
    foreign: Option<FrameHeader>,
    failure: Option<Notification>,
}

impl StreamHandler for AcceptTracker {
    fn wants_frames(&self) -> bool {
        self.open.is_some()
    }

    fn on_line(&mut self, line: String) -> Flow {
        match Notification::parse(&line) {
            Some(Notification::Connect(id)) => {
                debug!("connection {} open", id);
                self.open = Some(id);
                Flow::Continue
            }
            Some(notification) => {
                self.failure = Some(notification);
                Flow::Stop
            }
            None => Flow::Continue,
        }
    }

    fn on_frame_header(&mut self, header: FrameHeader) -> Flow {
        if self.open == Some(header.id) {
            self.header = Some(header);
            Flow::Stop
        } else {
            warn!(
                "ignoring frame header for connection {} (open: {:?})",
                header.id, self.open
            );
            self.open = None;
            self.foreign = Some(header);
            Flow::Stop
        }
    }
}

impl<T: Transport, C: Clock> StreamReader<T, C> {
    /// Wait for a connection and return the first frame delivered on it.
    ///
    /// There is no overall timeout; the call returns on a frame, on a
    /// close/fail notification, or on a transport fault. Declared lengths
    /// above `max_frame_len` yield an empty payload. A header for any other
    /// connection clears the open state and its body is skipped. Each body
    /// read after the buffered bytes waits at most `body_slice`.
    pub fn extract_frame(
        &mut self,
        max_frame_len: usize,
        line_slice: Duration,
        body_slice: Duration,
    ) -> AtResult<Frame> {
        let mut tracker = AcceptTracker::default();
        loop {
            if let PumpEnd::Fault(e) = self.pump(&mut tracker, None, line_slice) {
                return Err(AtError::Transport(e));
            }
            // A foreign frame's body is skipped so it never parses as lines.
            match tracker.foreign.take() {
                Some(foreign) => {
                    let len = clamp_len(foreign.declared_len, max_frame_len);
                    let skipped = self.read_payload(len, body_slice)?;
                    debug!(
                        "skipped {} of {} body bytes for connection {}",
                        skipped.len(),
                        len,
                        foreign.id
                    );
                }
                None => break,
            }
        }

        let header = match (tracker.failure, tracker.header) {
            (Some(notification), _) => {
                let id = notification.id();
                return Err(match notification {
                    Notification::ConnectFail(_) => AtError::ConnectFailed { id },
                    Notification::Closed(_) | Notification::Connect(_) => {
                        AtError::ConnectionClosed { id }
                    }
                });
            }
            (None, Some(header)) => header,
            (None, None) => {
                return Err(AtError::Transport(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "reception ended without a frame",
                )))
            }
        };

        let len = clamp_len(header.declared_len, max_frame_len);

        let payload = self.read_payload(len, body_slice)?;
        if payload.len() < len {
            return Err(AtError::IncompleteFrame {
                id: header.id,
                expected: len,
                payload,
            });
        }
        Ok(Frame {
            id: header.id,
            payload,
        })
    }
}

/// Apply the frame size limit; oversized declarations carry no payload.
fn clamp_len(declared: usize, max_frame_len: usize) -> usize {
    if declared > max_frame_len {
        warn!(
            "declared frame length {} exceeds limit {}, dropping payload",
            declared, max_frame_len
        );
        0
    } else {
        declared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ManualClock, ScriptedTransport};

    const LINE: Duration = Duration::from_millis(3);
    const BODY: Duration = Duration::from_millis(100);

    fn extract(transport: ScriptedTransport, clock: ManualClock, max: usize) -> (AtResult<Frame>, usize) {
        let mut reader = StreamReader::new(transport, clock, 1024);
        let result = reader.extract_frame(max, LINE, BODY);
        (result, reader.buffered_len())
    }

    #[test]
    fn test_frame_after_connect() {
        let clock = ManualClock::new();
        let mut transport = ScriptedTransport::new(clock.clone()).fault_when_exhausted();
        transport.push_lines(&["0,CONNECT", ""]);
        transport.push_bytes(b"+IPD,0,5:HELLO");

        let (result, _) = extract(transport, clock, 100_000);
        let frame = result.unwrap();
        assert_eq!(frame.id, ConnectionId(0));
        assert_eq!(frame.payload, b"HELLO");
    }

    #[test]
    fn test_header_split_from_body() {
        let clock = ManualClock::new();
        let mut transport = ScriptedTransport::new(clock.clone());
        transport.push_bytes(b"1,CONNECT\r\n\r\n+IPD,1,");
        transport.push_bytes(b"10:0123");
        transport.push_bytes(b"456789\r\nOK\r\n");

        let (result, leftover) = extract(transport, clock, 100_000);
        let frame = result.unwrap();
        assert_eq!(frame.id, ConnectionId(1));
        assert_eq!(frame.payload, b"0123456789");
        assert_eq!(leftover, 6);
    }

    #[test]
    fn test_foreign_header_ignored() {
        let clock = ManualClock::new();
        let mut transport = ScriptedTransport::new(clock.clone()).fault_when_exhausted();
        transport.push_lines(&["0,CONNECT"]);
        transport.push_bytes(b"+IPD,1,3:abc\r\n");
        transport.push_lines(&["0,CONNECT"]);
        transport.push_bytes(b"+IPD,0,2:ok");

        let (result, _) = extract(transport, clock, 100_000);
        let frame = result.unwrap();
        assert_eq!(frame.id, ConnectionId(0));
        assert_eq!(frame.payload, b"ok");
    }

    #[test]
    fn test_foreign_body_not_read_as_notification() {
        let clock = ManualClock::new();
        let mut transport = ScriptedTransport::new(clock.clone()).fault_when_exhausted();
        transport.push_lines(&["0,CONNECT"]);
        transport.push_bytes(b"+IPD,1,10:3,CLOSED\r\n");
        transport.push_lines(&["0,CONNECT"]);
        transport.push_bytes(b"+IPD,0,2:ok");

        let (result, leftover) = extract(transport, clock, 100_000);
        let frame = result.unwrap();
        assert_eq!(frame.id, ConnectionId(0));
        assert_eq!(frame.payload, b"ok");
        assert_eq!(leftover, 0);
    }

    #[test]
    fn test_foreign_body_split_across_reads() {
        let clock = ManualClock::new();
        let mut transport = ScriptedTransport::new(clock.clone()).fault_when_exhausted();
        transport.push_lines(&["2,CONNECT"]);
        transport.push_bytes(b"+IPD,4,10:2,C");
        transport.push_bytes(b"LOSED\r\n");
        transport.push_lines(&["2,CONNECT"]);
        transport.push_bytes(b"+IPD,2,3:abc");

        let (result, _) = extract(transport, clock, 100_000);
        assert_eq!(result.unwrap().payload, b"abc");
    }

    #[test]
    fn test_header_before_connect_is_a_line() {
        let clock = ManualClock::new();
        let mut transport = ScriptedTransport::new(clock.clone()).fault_when_exhausted();
        transport.push_bytes(b"+IPD,0,3:abc\r\n");
        transport.push_lines(&["0,CONNECT"]);
        transport.push_bytes(b"+IPD,0,3:xyz");

        let (result, _) = extract(transport, clock, 100_000);
        assert_eq!(result.unwrap().payload, b"xyz");
    }

    #[test]
    fn test_oversized_length_clamped_to_zero() {
        let clock = ManualClock::new();
        let mut transport = ScriptedTransport::new(clock.clone());
        transport.push_lines(&["0,CONNECT"]);
        transport.push_bytes(b"+IPD,0,999999:data");

        let (result, leftover) = extract(transport, clock, 100_000);
        let frame = result.unwrap();
        assert_eq!(frame.id, ConnectionId(0));
        assert!(frame.payload.is_empty());
        assert_eq!(leftover, 4);
    }

    #[test]
    fn test_closed_before_frame() {
        let clock = ManualClock::new();
        let mut transport = ScriptedTransport::new(clock.clone());
        transport.push_lines(&["2,CONNECT", "2,CLOSED"]);

        let (result, _) = extract(transport, clock, 100_000);
        assert!(matches!(
            result,
            Err(AtError::ConnectionClosed { id: ConnectionId(2) })
        ));
    }

    #[test]
    fn test_connect_fail() {
        let clock = ManualClock::new();
        let mut transport = ScriptedTransport::new(clock.clone());
        transport.push_lines(&["0,CONNECT FAIL"]);

        let (result, _) = extract(transport, clock, 100_000);
        assert!(matches!(
            result,
            Err(AtError::ConnectFailed { id: ConnectionId(0) })
        ));
    }

    #[test]
    fn test_truncated_body() {
        let clock = ManualClock::new();
        let mut transport = ScriptedTransport::new(clock.clone());
        transport.push_lines(&["0,CONNECT"]);
        transport.push_bytes(b"+IPD,0,8:abc");

        let (result, _) = extract(transport, clock, 100_000);
        match result {
            Err(AtError::IncompleteFrame { id, expected, payload }) => {
                assert_eq!(id, ConnectionId(0));
                assert_eq!(expected, 8);
                assert_eq!(payload, b"abc");
            }
            other => panic!("expected incomplete frame, got {:?}", other),
        }
    }

    #[test]
    fn test_transport_fault_while_waiting() {
        let clock = ManualClock::new();
        let transport = ScriptedTransport::new(clock.clone()).fault_when_exhausted();

        let (result, _) = extract(transport, clock, 100_000);
        assert!(matches!(result, Err(AtError::Transport(_))));
    }
}
