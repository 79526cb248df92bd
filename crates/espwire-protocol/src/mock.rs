//! Scripted transport and manual clock for deterministic tests.
//!
//! [`ScriptedTransport`] replays a queue of read results. Whenever it reports
//! "no data" it advances the shared [`ManualClock`] by the read timeout it was
//! given, so timeout logic runs without real waits.

use std::cell::Cell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use crate::transport::{Clock, Transport};

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    /// Create a clock at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

/// One scripted read result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    /// Deliver these bytes (split across reads if the buffer is smaller).
    Data(Vec<u8>),
    /// Report no data and let the read timeout elapse.
    Idle,
    /// Fail the read with an I/O error.
    Fault,
    /// Report more bytes than the buffer holds.
    Overrun,
}

/// What happens once the script runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhausted {
    /// Behave like a silent link: report no data after the timeout.
    Idle,
    /// Fail every further read.
    Fault,
}

/// Transport replaying a fixed script of reads.
#[derive(Debug)]
pub struct ScriptedTransport {
    clock: ManualClock,
    steps: VecDeque<ScriptStep>,
    exhausted: Exhausted,
    /// Steps that become readable right after each write, in write order.
    replies: VecDeque<Vec<ScriptStep>>,
    written: Vec<u8>,
    flushes: usize,
    reads: usize,
}

impl ScriptedTransport {
    /// Create an empty script sharing `clock`.
    pub fn new(clock: ManualClock) -> Self {
        ScriptedTransport {
            clock,
            steps: VecDeque::new(),
            exhausted: Exhausted::Idle,
            replies: VecDeque::new(),
            written: Vec::new(),
            flushes: 0,
            reads: 0,
        }
    }

    /// Fail reads once the script is used up instead of idling.
    pub fn fault_when_exhausted(mut self) -> Self {
        self.exhausted = Exhausted::Fault;
        self
    }

    /// Queue raw bytes for one read.
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.steps.push_back(ScriptStep::Data(data.to_vec()));
    }

    /// Queue each line followed by CRLF, one read per line.
    pub fn push_lines(&mut self, lines: &[&str]) {
        for line in lines {
            self.push_bytes(format!("{}\r\n", line).as_bytes());
        }
    }

    /// Queue a read that returns nothing.
    pub fn push_idle(&mut self) {
        self.steps.push_back(ScriptStep::Idle);
    }

    /// Queue a failing read.
    pub fn push_fault(&mut self) {
        self.steps.push_back(ScriptStep::Fault);
    }

    /// Queue a read reporting an impossible length.
    pub fn push_overrun(&mut self) {
        self.steps.push_back(ScriptStep::Overrun);
    }

    /// Queue steps released by the next write not yet claimed by an earlier
    /// reply. Any steps still queued are discarded at that point, which is
    /// how a real module drops output once a new command starts.
    pub fn reply_to_next_write(&mut self, steps: Vec<ScriptStep>) {
        self.replies.push_back(steps);
    }

    /// Convenience for [`reply_to_next_write`](Self::reply_to_next_write)
    /// with CRLF lines.
    pub fn reply_lines(&mut self, lines: &[&str]) {
        let steps = lines
            .iter()
            .map(|line| ScriptStep::Data(format!("{}\r\n", line).into_bytes()))
            .collect();
        self.reply_to_next_write(steps);
    }

    /// All bytes written so far.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Written bytes as text.
    pub fn written_str(&self) -> String {
        String::from_utf8_lossy(&self.written).into_owned()
    }

    /// Number of `flush_input` calls.
    pub fn flush_count(&self) -> usize {
        self.flushes
    }

    /// Number of `read` calls.
    pub fn read_count(&self) -> usize {
        self.reads
    }

    /// Number of scripted steps not yet consumed.
    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

impl Transport for ScriptedTransport {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.reads += 1;
        let step = match self.steps.pop_front() {
            Some(step) => step,
            None => match self.exhausted {
                Exhausted::Idle => ScriptStep::Idle,
                Exhausted::Fault => ScriptStep::Fault,
            },
        };

        match step {
            ScriptStep::Data(mut data) => {
                if data.len() > buf.len() {
                    let rest = data.split_off(buf.len());
                    self.steps.push_front(ScriptStep::Data(rest));
                }
                buf[..data.len()].copy_from_slice(&data);
                Ok(data.len())
            }
            ScriptStep::Idle => {
                self.clock.advance(timeout);
                Ok(0)
            }
            ScriptStep::Fault => Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted fault")),
            ScriptStep::Overrun => Ok(buf.len() + 1),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.written.extend_from_slice(data);
        if let Some(reply) = self.replies.pop_front() {
            self.steps = reply.into();
        }
        Ok(())
    }

    fn flush_input(&mut self, _timeout: Duration) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}
