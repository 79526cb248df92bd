//! Command dispatch and high-level module operations.
//!
//! [`Module`] owns the [`StreamReader`] and is the only user of the
//! transport. Command dispatch and frame extraction run one at a time on
//! the same reader, so unconsumed bytes carry over from one to the next.

use std::net::Ipv4Addr;
use std::time::Duration;

use log::{debug, info, warn};

use crate::codec::StreamCursor;
use crate::commands::{validate_command_text, Command};
use crate::error::{AtError, AtResult};
use crate::frame::{ConnectionId, Frame};
use crate::receiver::{ReceiveMode, Reception, ReceptionEnd, StreamReader};
use crate::responses::{parse_ipv4, require, HardwareAddress, Notification};
use crate::transport::{Clock, SystemClock, Transport};

/// Prompt printed by the module when it is ready for send payload bytes.
pub const SEND_PROMPT: &[u8] = b"> ";

/// Tunable limits and timeouts for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// Acknowledgement timeout used when the caller gives none (milliseconds).
    pub default_timeout_ms: u64,
    /// Per-read wait while assembling lines (milliseconds).
    pub line_read_slice_ms: u64,
    /// Per-read wait while completing a frame body (milliseconds).
    pub frame_read_slice_ms: u64,
    /// Maximum bytes pulled from the transport per read.
    pub read_chunk_size: usize,
    /// Largest accepted declared frame length; longer frames yield an empty
    /// payload.
    pub max_frame_len: usize,
    /// Attempts made by the plain command form.
    pub default_retries: u32,
    /// Receive polls made while joining a network, the first one carrying
    /// the join command.
    pub join_poll_attempts: u32,
    /// Timeout of each join poll (milliseconds).
    pub join_poll_timeout_ms: u64,
    /// Settling time given to the link when flushing input (milliseconds).
    pub flush_timeout_ms: u64,
    /// Timeout waiting for a send command to be acknowledged (milliseconds).
    pub send_prompt_timeout_ms: u64,
    /// Timeout waiting for `SEND OK` after the payload (milliseconds).
    pub send_confirm_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            default_timeout_ms: 100,
            line_read_slice_ms: 3,
            frame_read_slice_ms: 100,
            read_chunk_size: 1024,
            max_frame_len: 100_000,
            default_retries: 3,
            join_poll_attempts: 600,
            join_poll_timeout_ms: 100,
            flush_timeout_ms: 100,
            send_prompt_timeout_ms: 500,
            send_confirm_timeout_ms: 1000,
        }
    }
}

impl EngineConfig {
    /// Get the default acknowledgement timeout.
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Get the per-read wait for line assembly.
    pub fn line_read_slice(&self) -> Duration {
        Duration::from_millis(self.line_read_slice_ms)
    }

    /// Get the per-read wait for frame bodies.
    pub fn frame_read_slice(&self) -> Duration {
        Duration::from_millis(self.frame_read_slice_ms)
    }

    /// Get the timeout of each join poll.
    pub fn join_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.join_poll_timeout_ms)
    }

    /// Get the flush settling time.
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    /// Get the send acknowledgement timeout.
    pub fn send_prompt_timeout(&self) -> Duration {
        Duration::from_millis(self.send_prompt_timeout_ms)
    }

    /// Get the send confirmation timeout.
    pub fn send_confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.send_confirm_timeout_ms)
    }
}

/// A serial-attached WiFi module driven through AT commands.
pub struct Module<T, C = SystemClock> {
    reader: StreamReader<T, C>,
    config: EngineConfig,
}

impl<T: Transport> Module<T, SystemClock> {
    /// Create a module on `transport` with default settings.
    pub fn new(transport: T) -> Self {
        Self::with_clock(transport, SystemClock::new(), EngineConfig::default())
    }

    /// Create a module on `transport` with the given settings.
    pub fn with_config(transport: T, config: EngineConfig) -> Self {
        Self::with_clock(transport, SystemClock::new(), config)
    }
}

impl<T: Transport, C: Clock> Module<T, C> {
    /// Create a module with an explicit clock.
    pub fn with_clock(transport: T, clock: C, config: EngineConfig) -> Self {
        Module {
            reader: StreamReader::new(transport, clock, config.read_chunk_size),
            config,
        }
    }

    /// Get the engine settings.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get the transport.
    pub fn transport(&self) -> &T {
        self.reader.transport()
    }

    /// Get the transport mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        self.reader.transport_mut()
    }

    /// Consume the module, returning the transport.
    pub fn into_transport(self) -> T {
        self.reader.into_transport()
    }

    /// Collect lines in `mode`. `None` or a zero timeout selects the
    /// default timeout.
    pub fn receive(&mut self, mode: ReceiveMode, timeout: Option<Duration>) -> Reception {
        let timeout = self.resolve_timeout(timeout);
        self.reader
            .read_lines(mode, timeout, self.config.line_read_slice())
    }

    fn resolve_timeout(&self, timeout: Option<Duration>) -> Duration {
        match timeout {
            Some(timeout) if !timeout.is_zero() => timeout,
            _ => self.config.default_timeout(),
        }
    }

    /// Send `text` (if non-empty) and collect its acknowledgement, once.
    ///
    /// Complete lines still buffered from earlier traffic are dropped before
    /// a command goes out so they cannot acknowledge it.
    fn attempt(&mut self, text: &str, label: &str, timeout: Duration) -> AtResult<Reception> {
        if !text.is_empty() {
            self.reader.discard_stale_lines();
            debug!(">> {}", label);
            self.reader.write_all(&StreamCursor::encode_command(text))?;
        }
        Ok(self.receive(ReceiveMode::Acknowledgement, Some(timeout)))
    }

    /// Send a command and wait for `OK`, retrying up to `retries` attempts.
    ///
    /// An empty `text` sends nothing and only listens. Input is flushed
    /// between attempts. Zero retries make no attempt and fail. Returns the
    /// lines of the successful attempt.
    pub fn dispatch(
        &mut self,
        text: &str,
        retries: u32,
        timeout: Option<Duration>,
    ) -> AtResult<Vec<String>> {
        validate_command_text(text)?;
        self.dispatch_labelled(text, text, retries, timeout)
    }

    fn dispatch_labelled(
        &mut self,
        text: &str,
        label: &str,
        retries: u32,
        timeout: Option<Duration>,
    ) -> AtResult<Vec<String>> {
        let timeout = self.resolve_timeout(timeout);
        let mut last = Vec::new();

        for attempt in 1..=retries {
            if attempt > 1 {
                debug!("retrying {:?} (attempt {}/{})", label, attempt, retries);
                self.reader.flush_input(self.config.flush_timeout())?;
            }
            let reception = self.attempt(text, label, timeout)?;
            if reception.contains_ok() {
                return Ok(reception.lines);
            }
            last = reception.lines;
        }

        warn!("{:?} not acknowledged after {} attempt(s)", label, retries);
        Err(AtError::NoAcknowledgement {
            command: label.to_string(),
            attempts: retries,
            lines: last,
        })
    }

    /// Send a command with the default retries and timeout.
    pub fn run(&mut self, text: &str) -> AtResult<Vec<String>> {
        self.dispatch(text, self.config.default_retries, None)
    }

    /// Send a typed command with the default retries and timeout.
    pub fn execute(&mut self, command: &Command) -> AtResult<Vec<String>> {
        self.execute_with(command, self.config.default_retries, None)
    }

    /// Send a typed command with explicit retries and timeout.
    pub fn execute_with(
        &mut self,
        command: &Command,
        retries: u32,
        timeout: Option<Duration>,
    ) -> AtResult<Vec<String>> {
        let text = command.to_command_string();
        validate_command_text(&text)?;
        let label = redacted(command, &text);
        self.dispatch_labelled(&text, &label, retries, timeout)
    }

    /// Join an access point.
    ///
    /// The join command is sent once; later polls only listen, because the
    /// module can take many seconds to associate. Returns every line seen.
    pub fn join(&mut self, ssid: &str, password: &str) -> AtResult<Vec<String>> {
        let command = Command::JoinNetwork {
            ssid: ssid.to_string(),
            password: password.to_string(),
        };
        let text = command.to_command_string();
        validate_command_text(&text)?;
        let label = redacted(&command, &text);
        let timeout = self.config.join_poll_timeout();
        let polls = self.config.join_poll_attempts.max(1);

        let mut seen = Vec::new();
        for poll in 0..polls {
            let sent = if poll == 0 { text.as_str() } else { "" };
            let reception = self.attempt(sent, &label, timeout)?;
            let ok = reception.contains_ok();
            seen.extend(reception.lines);
            if ok {
                info!("joined network {:?} after {} poll(s)", ssid, poll + 1);
                return Ok(seen);
            }
        }

        warn!("join of {:?} not acknowledged after {} poll(s)", ssid, polls);
        Err(AtError::JoinTimedOut { polls })
    }

    /// Query a `key<sep>value` field with the default retries.
    fn query(&mut self, command: &Command) -> AtResult<String> {
        let lines = self.execute(command)?;
        let (key, sep) = command.result_key().ok_or_else(|| {
            AtError::InvalidCommand(format!("{} has no result field", command.to_command_string()))
        })?;
        Ok(require(&lines, key, sep)?.to_string())
    }

    /// Get the station's IPv4 address.
    pub fn local_address(&mut self) -> AtResult<Ipv4Addr> {
        let value = self.query(&Command::QueryLocalAddress)?;
        parse_ipv4(&value)
    }

    /// Get the station hardware address.
    pub fn station_hardware_address(&mut self) -> AtResult<HardwareAddress> {
        self.query(&Command::QueryStationMac)?.parse()
    }

    /// Get the access point hardware address.
    pub fn ap_hardware_address(&mut self) -> AtResult<HardwareAddress> {
        self.query(&Command::QueryApMac)?.parse()
    }

    /// Wait for a connection by lines alone.
    ///
    /// Succeeds when at least three lines were collected and the first one is
    /// `<id>,CONNECT`. There is no timeout.
    pub fn wait_connection(&mut self) -> AtResult<(ConnectionId, Vec<String>)> {
        let reception = self.receive(ReceiveMode::ConnectionWait, None);
        if let ReceptionEnd::Fault(e) = reception.end {
            return Err(AtError::Transport(e));
        }

        let lines = reception.lines;
        if lines.len() >= ReceiveMode::CONNECTION_WAIT_MIN_LINES {
            if let Some(Notification::Connect(id)) = Notification::parse(&lines[0]) {
                return Ok((id, lines));
            }
        }
        match lines.iter().rev().find_map(|line| Notification::parse(line)) {
            Some(Notification::Closed(id)) => Err(AtError::ConnectionClosed { id }),
            Some(Notification::ConnectFail(id)) => Err(AtError::ConnectFailed { id }),
            _ => Err(AtError::NoConnection { lines }),
        }
    }

    /// Wait for a connection and return the first frame delivered on it.
    pub fn accept(&mut self) -> AtResult<Frame> {
        let frame = self.reader.extract_frame(
            self.config.max_frame_len,
            self.config.line_read_slice(),
            self.config.frame_read_slice(),
        )?;
        debug!("frame on connection {}: {} bytes", frame.id, frame.payload.len());
        Ok(frame)
    }

    /// Send `payload` on a connection and wait for `SEND OK`.
    pub fn send(&mut self, id: ConnectionId, payload: &[u8]) -> AtResult<()> {
        let command = Command::Send {
            id,
            len: payload.len(),
        };
        let timeout = self.config.send_prompt_timeout();
        self.execute_with(&command, 1, Some(timeout))?;
        self.reader.discard_prompt(SEND_PROMPT);

        self.reader.write_all(payload)?;
        let confirm = self.config.send_confirm_timeout();
        let reception = self.receive(ReceiveMode::SendConfirm, Some(confirm));
        match reception.end {
            ReceptionEnd::Terminated => Ok(()),
            ReceptionEnd::Fault(e) => Err(AtError::Transport(e)),
            ReceptionEnd::TimedOut => Err(AtError::SendNotConfirmed { id }),
        }
    }

    /// Close a connection.
    pub fn close(&mut self, id: ConnectionId) -> AtResult<()> {
        self.execute(&Command::Close { id })?;
        Ok(())
    }
}

/// Text used in logs and errors for `command`.
fn redacted(command: &Command, text: &str) -> String {
    match command {
        Command::JoinNetwork { ssid, .. } => format!("AT+CWJAP=\"{}\",<redacted>", ssid),
        _ if command.is_sensitive() => "<redacted>".to_string(),
        _ => text.to_string(),
    }
}
