//! In-memory transport that replays a scripted device
//!
//! Every write is handed to a responder closure that decides what the
//! simulated device prints back and after how long.

use super::{Transport, TransportError};
use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

/// What the simulated device does in reply to one write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Print these lines once `after` has elapsed
    Lines { lines: Vec<String>, after: Duration },
    /// Print nothing
    Silence,
    /// Fail the write itself
    Fault(String),
}

impl Reply {
    /// One line, available immediately
    pub fn line(text: impl Into<String>) -> Self {
        Self::Lines {
            lines: vec![text.into()],
            after: Duration::ZERO,
        }
    }

    /// One line, available after `after`
    pub fn line_after(text: impl Into<String>, after: Duration) -> Self {
        Self::Lines {
            lines: vec![text.into()],
            after,
        }
    }
}

type Responder = Box<dyn FnMut(&[u8]) -> Reply + Send>;

/// Scripted stand-in for the device under test
pub struct ScriptedTransport {
    responder: Responder,
    queued: VecDeque<(Instant, String)>,
    written: Vec<Vec<u8>>,
    read_fault: Option<String>,
    resets: usize,
    closed: bool,
}

impl ScriptedTransport {
    pub fn new(responder: impl FnMut(&[u8]) -> Reply + Send + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            queued: VecDeque::new(),
            written: Vec::new(),
            read_fault: None,
            resets: 0,
            closed: false,
        }
    }

    /// A device that never answers
    pub fn silent() -> Self {
        Self::new(|_| Reply::Silence)
    }

    /// A device that reports a scancode line for every write
    pub fn echo_scancode() -> Self {
        Self::new(|bytes| {
            Reply::Lines {
                lines: vec![
                    format!("INPUT: 0x{}", hex::encode_upper(bytes)),
                    "SCANCODE: 0x1C".to_string(),
                ],
                after: Duration::ZERO,
            }
        })
    }

    /// Lines already waiting when the link opens
    pub fn with_startup(mut self, lines: &[&str]) -> Self {
        let now = Instant::now();
        for line in lines {
            self.queued.push_back((now, line.to_string()));
        }
        self
    }

    /// Make every subsequent read fail with `message`
    pub fn fail_reads(&mut self, message: impl Into<String>) {
        self.read_fault = Some(message.into());
    }

    /// Every byte sequence written so far, in order
    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }

    pub fn reset_count(&self) -> usize {
        self.resets
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn check_read(&self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        match &self.read_fault {
            Some(msg) => Err(TransportError::Fault(msg.clone())),
            None => Ok(()),
        }
    }

    fn front_ready(&self, now: Instant) -> bool {
        self.queued.front().is_some_and(|(at, _)| *at <= now)
    }
}

impl Transport for ScriptedTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.written.push(bytes.to_vec());
        match (self.responder)(bytes) {
            Reply::Lines { lines, after } => {
                let at = Instant::now() + after;
                self.queued.extend(lines.into_iter().map(|l| (at, l)));
                Ok(())
            }
            Reply::Silence => Ok(()),
            Reply::Fault(msg) => Err(TransportError::Fault(msg)),
        }
    }

    fn has_data(&mut self) -> Result<bool, TransportError> {
        self.check_read()?;
        Ok(self.front_ready(Instant::now()))
    }

    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, TransportError> {
        self.check_read()?;
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if self.front_ready(now) {
                return Ok(self.queued.pop_front().map(|(_, line)| line));
            }
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(Duration::from_micros(200));
        }
    }

    fn reset_input(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.resets += 1;
        self.queued.clear();
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        self.queued.clear();
        Ok(())
    }
}
