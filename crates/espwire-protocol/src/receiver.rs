//! Line-oriented reception from the module.
//!
//! All reads from the transport go through one [`StreamReader`]. Its
//! [`pump`](StreamReader::pump) loop pulls bytes in short slices, hands every
//! completed line (and, when asked, every frame header) to a
//! [`StreamHandler`], and stops when the handler says so, when the timeout
//! expires, or when the transport faults. The mode-specific line collectors
//! and the frame extractor are both handlers over this loop, so they share
//! one byte buffer and never lose bytes to each other.

use std::io;
use std::time::Duration;

use log::{debug, warn};

use crate::codec::{HeaderScan, StreamCursor};
use crate::frame::FrameHeader;
use crate::transport::{Clock, Transport};

/// Termination grammar used while assembling lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiveMode {
    /// Command acknowledgement: stop on `OK` or timeout.
    Acknowledgement,
    /// Waiting for a peer: no timeout; stop on a blank line once at least
    /// three lines are collected, or on a close/fail notification.
    ConnectionWait,
    /// Transmit confirmation: stop on `SEND OK` or timeout.
    SendConfirm,
}

impl ReceiveMode {
    /// Minimum lines collected (including the blank one) before a blank
    /// line ends a connection wait.
    pub const CONNECTION_WAIT_MIN_LINES: usize = 3;

    /// Whether the caller's timeout bounds this mode.
    pub fn uses_timeout(&self) -> bool {
        !matches!(self, ReceiveMode::ConnectionWait)
    }

    /// Check whether `line`, the `collected`-th line seen, ends reception.
    pub fn is_terminal(&self, line: &str, collected: usize) -> bool {
        match self {
            ReceiveMode::Acknowledgement => line == "OK",
            ReceiveMode::ConnectionWait => {
                (collected >= Self::CONNECTION_WAIT_MIN_LINES && line.is_empty())
                    || line.contains(",CLOSED")
                    || line.contains(",CONNECT FAIL")
            }
            ReceiveMode::SendConfirm => line == "SEND OK",
        }
    }
}

/// Whether the pump loop should keep going after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep consuming.
    Continue,
    /// Return from the pump loop.
    Stop,
}

/// Receives events decoded from the stream.
pub trait StreamHandler {
    /// Whether the front of the buffer should be checked for a frame header
    /// before line decoding.
    fn wants_frames(&self) -> bool {
        false
    }

    /// Called for every completed, trimmed line.
    fn on_line(&mut self, line: String) -> Flow;

    /// Called for every parsed frame header. The payload bytes that follow
    /// it are still in the stream.
    fn on_frame_header(&mut self, header: FrameHeader) -> Flow {
        let _ = header;
        Flow::Continue
    }
}

/// How a pump loop ended.
#[derive(Debug)]
pub enum PumpEnd {
    /// The handler returned [`Flow::Stop`].
    Stopped,
    /// The timeout expired first.
    TimedOut,
    /// The transport returned an error or an implausible length.
    Fault(io::Error),
}

/// How a line reception ended.
#[derive(Debug)]
pub enum ReceptionEnd {
    /// A mode-specific terminal line was seen.
    Terminated,
    /// The timeout expired.
    TimedOut,
    /// The transport faulted; the lines are whatever arrived before.
    Fault(io::Error),
}

impl From<PumpEnd> for ReceptionEnd {
    fn from(end: PumpEnd) -> Self {
        match end {
            PumpEnd::Stopped => ReceptionEnd::Terminated,
            PumpEnd::TimedOut => ReceptionEnd::TimedOut,
            PumpEnd::Fault(e) => ReceptionEnd::Fault(e),
        }
    }
}

/// Lines collected by one reception, in arrival order.
#[derive(Debug)]
pub struct Reception {
    /// Trimmed lines.
    pub lines: Vec<String>,
    /// Why reception stopped.
    pub end: ReceptionEnd,
}

impl Reception {
    /// Check if any collected line is exactly `OK`.
    pub fn contains_ok(&self) -> bool {
        self.lines.iter().any(|line| line == "OK")
    }

    /// Check if reception ended on a terminal line.
    pub fn is_terminated(&self) -> bool {
        matches!(self.end, ReceptionEnd::Terminated)
    }

    /// Check if reception was cut short by a transport fault.
    pub fn is_fault(&self) -> bool {
        matches!(self.end, ReceptionEnd::Fault(_))
    }
}

/// Collects lines until the mode's terminal condition.
struct ModeCollector {
    mode: ReceiveMode,
    lines: Vec<String>,
}

impl StreamHandler for ModeCollector {
    fn on_line(&mut self, line: String) -> Flow {
        self.lines.push(line);
        let last = &self.lines[self.lines.len() - 1];
        if self.mode.is_terminal(last, self.lines.len()) {
            Flow::Stop
        } else {
            Flow::Continue
        }
    }
}

/// Owner of the transport, the clock and the shared byte buffer.
pub struct StreamReader<T, C> {
    transport: T,
    clock: C,
    cursor: StreamCursor,
    chunk: Vec<u8>,
}

impl<T: Transport, C: Clock> StreamReader<T, C> {
    /// Create a reader that pulls at most `chunk_size` bytes per read.
    pub fn new(transport: T, clock: C, chunk_size: usize) -> Self {
        StreamReader {
            transport,
            clock,
            cursor: StreamCursor::new(),
            chunk: vec![0u8; chunk_size.max(1)],
        }
    }

    /// Get the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get the transport mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Get the number of bytes read but not yet consumed.
    pub fn buffered_len(&self) -> usize {
        self.cursor.buffered_len()
    }

    /// Consume the reader, returning the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Write raw bytes to the module.
    pub fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.transport.write_all(data)
    }

    /// Discard stale input, both on the link and in the local buffer.
    pub fn flush_input(&mut self, timeout: Duration) -> io::Result<()> {
        if self.cursor.buffered_len() > 0 {
            debug!(
                "discarding {} buffered bytes: {:?}",
                self.cursor.buffered_len(),
                self.cursor.buffer_as_str()
            );
        }
        self.cursor.clear();
        self.transport.flush_input(timeout)
    }

    /// Drop a prompt the module printed without a line terminator.
    pub fn discard_prompt(&mut self, prompt: &[u8]) -> bool {
        self.cursor.strip_prefix(prompt)
    }

    /// Drop complete lines left over from earlier traffic, keeping any
    /// partial line. Returns the number of lines dropped.
    pub fn discard_stale_lines(&mut self) -> usize {
        let mut dropped = 0;
        while let Some(line) = self.cursor.decode_line() {
            debug!("discarding stale line {:?}", line);
            dropped += 1;
        }
        dropped
    }

    /// Run the consumption loop until the handler stops it.
    ///
    /// `timeout`, when set, is measured from the start of the call and is
    /// checked only when the buffer holds no complete event. Each transport
    /// read waits at most `slice`.
    pub fn pump<H: StreamHandler>(
        &mut self,
        handler: &mut H,
        timeout: Option<Duration>,
        slice: Duration,
    ) -> PumpEnd {
        let start = self.clock.now();
        loop {
            if self.drain(handler) == Flow::Stop {
                return PumpEnd::Stopped;
            }

            if let Some(timeout) = timeout {
                if self.clock.now().saturating_sub(start) >= timeout {
                    return PumpEnd::TimedOut;
                }
            }

            match self.fill(slice) {
                Ok(_) => {}
                Err(e) => {
                    warn!("transport fault during reception: {}", e);
                    return PumpEnd::Fault(e);
                }
            }
        }
    }

    /// Collect lines using the termination grammar of `mode`.
    pub fn read_lines(&mut self, mode: ReceiveMode, timeout: Duration, slice: Duration) -> Reception {
        let mut collector = ModeCollector {
            mode,
            lines: Vec::new(),
        };
        let timeout = mode.uses_timeout().then_some(timeout);
        let end = self.pump(&mut collector, timeout, slice);
        Reception {
            lines: collector.lines,
            end: end.into(),
        }
    }

    /// Read up to `len` payload bytes, buffered ones first.
    ///
    /// Further reads wait at most `slice` each. Reading stops early the first
    /// time a read yields nothing, so the result may be shorter than `len`.
    pub fn read_payload(&mut self, len: usize, slice: Duration) -> io::Result<Vec<u8>> {
        let mut payload = Vec::with_capacity(len);
        payload.extend(self.cursor.take(len));
        while payload.len() < len {
            if self.fill(slice)? == 0 {
                break;
            }
            let needed = len - payload.len();
            payload.extend(self.cursor.take(needed));
        }
        Ok(payload)
    }

    /// Hand every complete buffered event to the handler.
    fn drain<H: StreamHandler>(&mut self, handler: &mut H) -> Flow {
        loop {
            if handler.wants_frames() {
                match self.cursor.scan_frame_header() {
                    HeaderScan::Header(header) => {
                        debug!("<< +IPD,{},{}:", header.id, header.declared_len);
                        if handler.on_frame_header(header) == Flow::Stop {
                            return Flow::Stop;
                        }
                        continue;
                    }
                    HeaderScan::Malformed(text) => {
                        debug!("discarding malformed frame header {:?}", text);
                        continue;
                    }
                    HeaderScan::Incomplete => return Flow::Continue,
                    HeaderScan::NotHeader => {}
                }
            }

            match self.cursor.decode_line() {
                Some(line) => {
                    debug!("<< {}", line);
                    if handler.on_line(line) == Flow::Stop {
                        return Flow::Stop;
                    }
                }
                None => return Flow::Continue,
            }
        }
    }

    /// Perform one bounded read into the buffer, returning the byte count.
    fn fill(&mut self, slice: Duration) -> io::Result<usize> {
        let n = self.transport.read(&mut self.chunk, slice)?;
        if n > self.chunk.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("read returned {} bytes into a {} byte buffer", n, self.chunk.len()),
            ));
        }
        self.cursor.push(&self.chunk[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ManualClock, ScriptedTransport};

    const SLICE: Duration = Duration::from_millis(3);

    fn reader(transport: ScriptedTransport, clock: ManualClock) -> StreamReader<ScriptedTransport, ManualClock> {
        StreamReader::new(transport, clock, 1024)
    }

    #[test]
    fn test_acknowledgement_stops_on_ok() {
        let clock = ManualClock::new();
        let mut transport = ScriptedTransport::new(clock.clone());
        transport.push_lines(&["WIFI CONNECTED", "WIFI GOT IP", "OK"]);
        transport.push_bytes(b"trailing\r\n");

        let mut reader = reader(transport, clock);
        let reception = reader.read_lines(ReceiveMode::Acknowledgement, Duration::from_millis(100), SLICE);

        assert!(reception.is_terminated());
        assert!(reception.contains_ok());
        assert_eq!(reception.lines, vec!["WIFI CONNECTED", "WIFI GOT IP", "OK"]);
    }

    #[test]
    fn test_unterminated_bytes_time_out_empty() {
        let clock = ManualClock::new();
        let mut transport = ScriptedTransport::new(clock.clone());
        transport.push_bytes(b"no terminator here");

        let mut reader = reader(transport, clock.clone());
        let reception = reader.read_lines(ReceiveMode::SendConfirm, Duration::from_millis(50), SLICE);

        assert!(matches!(reception.end, ReceptionEnd::TimedOut));
        assert!(reception.lines.is_empty());
        assert!(clock.now() >= Duration::from_millis(50));
    }

    #[test]
    fn test_connection_wait_needs_three_lines() {
        let clock = ManualClock::new();
        let mut transport = ScriptedTransport::new(clock.clone());
        transport.push_lines(&["0,CONNECT", "", "GET / HTTP/1.1", "", "Host: x"]);

        let mut reader = reader(transport, clock);
        let reception = reader.read_lines(ReceiveMode::ConnectionWait, Duration::ZERO, SLICE);

        assert!(reception.is_terminated());
        assert_eq!(reception.lines, vec!["0,CONNECT", "", "GET / HTTP/1.1", ""]);
    }

    #[test]
    fn test_connection_wait_stops_on_closed() {
        let clock = ManualClock::new();
        let mut transport = ScriptedTransport::new(clock.clone());
        transport.push_lines(&["0,CONNECT", "0,CLOSED"]);

        let mut reader = reader(transport, clock);
        let reception = reader.read_lines(ReceiveMode::ConnectionWait, Duration::ZERO, SLICE);

        assert_eq!(reception.lines, vec!["0,CONNECT", "0,CLOSED"]);
    }

    #[test]
    fn test_fault_keeps_collected_lines() {
        let clock = ManualClock::new();
        let mut transport = ScriptedTransport::new(clock.clone());
        transport.push_lines(&["AT"]);
        transport.push_fault();

        let mut reader = reader(transport, clock);
        let reception = reader.read_lines(ReceiveMode::Acknowledgement, Duration::from_secs(1), SLICE);

        assert!(reception.is_fault());
        assert_eq!(reception.lines, vec!["AT"]);
    }

    #[test]
    fn test_over_capacity_read_is_fault() {
        let clock = ManualClock::new();
        let mut transport = ScriptedTransport::new(clock.clone());
        transport.push_overrun();

        let mut reader = reader(transport, clock);
        let reception = reader.read_lines(ReceiveMode::Acknowledgement, Duration::from_secs(1), SLICE);
        assert!(reception.is_fault());
    }

    #[test]
    fn test_idle_reads_do_not_reset_timeout() {
        let clock = ManualClock::new();
        let mut transport = ScriptedTransport::new(clock.clone());
        for _ in 0..10 {
            transport.push_idle();
            transport.push_bytes(b"x");
        }

        let mut reader = reader(transport, clock.clone());
        let reception = reader.read_lines(ReceiveMode::Acknowledgement, Duration::from_millis(20), SLICE);

        assert!(matches!(reception.end, ReceptionEnd::TimedOut));
        assert!(clock.now() >= Duration::from_millis(20));
        assert!(clock.now() < Duration::from_millis(30));
    }

    #[test]
    fn test_leftover_bytes_carry_to_next_reception() {
        let clock = ManualClock::new();
        let mut transport = ScriptedTransport::new(clock.clone());
        transport.push_bytes(b"OK\r\nSEND O");
        transport.push_bytes(b"K\r\n");

        let mut reader = reader(transport, clock);
        let first = reader.read_lines(ReceiveMode::Acknowledgement, Duration::from_millis(100), SLICE);
        assert_eq!(first.lines, vec!["OK"]);
        assert_eq!(reader.buffered_len(), 6);

        let second = reader.read_lines(ReceiveMode::SendConfirm, Duration::from_millis(100), SLICE);
        assert!(second.is_terminated());
        assert_eq!(second.lines, vec!["SEND OK"]);
    }

    #[test]
    fn test_read_payload_across_reads() {
        let clock = ManualClock::new();
        let mut transport = ScriptedTransport::new(clock.clone());
        transport.push_bytes(b"HEL");
        transport.push_bytes(b"LO\r\nOK\r\n");

        let mut reader = reader(transport, clock);
        let payload = reader.read_payload(5, Duration::from_millis(100)).unwrap();
        assert_eq!(payload, b"HELLO");
        assert_eq!(reader.buffered_len(), 6);
    }

    #[test]
    fn test_read_payload_stops_on_stall() {
        let clock = ManualClock::new();
        let mut transport = ScriptedTransport::new(clock.clone());
        transport.push_bytes(b"HEL");

        let mut reader = reader(transport, clock);
        let payload = reader.read_payload(5, Duration::from_millis(100)).unwrap();
        assert_eq!(payload, b"HEL");
    }
}
