//! Links to the module.
//!
//! [`SerialLink`] talks to a locally attached module. [`TcpLink`] talks to a
//! module whose UART is exposed over TCP by a serial bridge, which is also
//! handy for driving a simulated module.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

use espwire_protocol::Transport;
use serialport::{ClearBuffer, SerialPort};
use tracing::debug;

use crate::config::LinkTarget;
use crate::error::ServerResult;

/// Shortest read timeout handed to the OS; zero means "block forever" or
/// is rejected outright depending on the platform.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Open the link described by `target`.
pub fn open(target: &LinkTarget) -> ServerResult<Box<dyn Transport>> {
    match target {
        LinkTarget::Serial { path, baud_rate } => {
            Ok(Box::new(SerialLink::open(path, *baud_rate)?))
        }
        LinkTarget::Tcp { address } => Ok(Box::new(TcpLink::connect(address)?)),
    }
}

/// Module attached to a local serial device.
pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    /// Open `path` at `baud_rate`, 8N1.
    pub fn open(path: &str, baud_rate: u32) -> ServerResult<Self> {
        let port = serialport::new(path, baud_rate)
            .timeout(MIN_READ_TIMEOUT)
            .open()?;
        debug!(path, baud_rate, "opened serial port");
        Ok(SerialLink { port })
    }
}

impl Transport for SerialLink {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.port
            .set_timeout(timeout.max(MIN_READ_TIMEOUT))
            .map_err(io::Error::from)?;
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if is_idle(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()
    }

    fn flush_input(&mut self, timeout: Duration) -> io::Result<()> {
        thread::sleep(timeout);
        self.port
            .clear(ClearBuffer::Input)
            .map_err(io::Error::from)
    }
}

/// Module reached through a TCP serial bridge.
pub struct TcpLink {
    stream: TcpStream,
}

impl TcpLink {
    /// Connect to a bridge at `address` (`host:port`).
    pub fn connect(address: &str) -> ServerResult<Self> {
        let stream = TcpStream::connect(address)?;
        stream.set_nodelay(true)?;
        debug!(address, "connected to serial bridge");
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        TcpLink { stream }
    }
}

impl Transport for TcpLink {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.stream
            .set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))?;
        match self.stream.read(buf) {
            // A zero-length read on a socket is end of stream, not silence.
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "serial bridge closed the connection",
            )),
            Ok(n) => Ok(n),
            Err(e) if is_idle(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data)?;
        self.stream.flush()
    }

    /// Drop input until the bridge goes quiet or `timeout` has elapsed.
    fn flush_input(&mut self, timeout: Duration) -> io::Result<()> {
        let started = Instant::now();
        let mut scratch = [0u8; 256];
        let mut dropped = 0;
        loop {
            let left = timeout.saturating_sub(started.elapsed());
            if left.is_zero() {
                break;
            }
            match self.read(&mut scratch, left)? {
                0 => break,
                n => dropped += n,
            }
        }
        if dropped > 0 {
            debug!(dropped, "flushed bridge input");
        }
        Ok(())
    }
}

fn is_idle(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
