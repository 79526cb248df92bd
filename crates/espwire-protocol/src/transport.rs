//! Byte transport and clock abstractions.
//!
//! The engine never touches a serial port directly. It reads through a
//! [`Transport`], which only has to offer short blocking reads with a
//! timeout, blocking writes and an input flush. Elapsed time is measured
//! through a [`Clock`] so timeout handling can be driven by tests.

use std::io;
use std::time::{Duration, Instant};

/// Blocking byte-level link to the module.
///
/// The link is assumed reliable at the byte level but not at the message
/// level: bytes arrive in order, but in arbitrary chunk sizes.
pub trait Transport {
    /// Read available bytes into `buf`, waiting at most `timeout`.
    ///
    /// Returns `Ok(0)` when nothing arrived within the timeout. A return
    /// value larger than `buf.len()` is treated as a transport fault.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Write all bytes to the module.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Discard any input buffered by the link, waiting at most `timeout`
    /// for in-flight bytes to settle.
    fn flush_input(&mut self, timeout: Duration) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        (**self).read(buf, timeout)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        (**self).write_all(data)
    }

    fn flush_input(&mut self, timeout: Duration) -> io::Result<()> {
        (**self).flush_input(timeout)
    }
}

/// Monotonic time source.
pub trait Clock {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

/// Clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose origin is the current instant.
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}
