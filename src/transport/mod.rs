//! Byte-oriented duplex link to the device under test
//!
//! The harness only needs a handful of operations from the link: write a
//! sequence, check whether response data is pending, pull one text line with
//! a timeout, and discard stale input. [`TtyTransport`] drives a real serial
//! port; [`ScriptedTransport`] stands in for the device in tests.

pub mod mock;
#[cfg(unix)]
pub mod tty;

pub use mock::{Reply, ScriptedTransport};
#[cfg(unix)]
pub use tty::TtyTransport;

use log::{debug, info};
use std::collections::VecDeque;
use std::io;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Error type for transport operations
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[cfg(unix)]
    #[error("terminal configuration failed: {0}")]
    Termios(#[from] nix::Error),

    #[error("unsupported baud rate: {0}")]
    UnsupportedBaud(u32),

    #[error("transport is closed")]
    Closed,

    /// Fault reported by a simulated link
    #[error("{0}")]
    Fault(String),
}

/// Line-oriented duplex channel to the device
pub trait Transport {
    /// Write a byte sequence and flush it to the device
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Whether response data is waiting to be read
    fn has_data(&mut self) -> Result<bool, TransportError>;

    /// Read one non-empty line, waiting at most `timeout`
    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, TransportError>;

    /// Discard any buffered input
    fn reset_input(&mut self) -> Result<(), TransportError>;

    /// Release the link. Further operations fail with [`TransportError::Closed`].
    fn close(&mut self) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write(bytes)
    }

    fn has_data(&mut self) -> Result<bool, TransportError> {
        (**self).has_data()
    }

    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, TransportError> {
        (**self).read_line(timeout)
    }

    fn reset_input(&mut self) -> Result<(), TransportError> {
        (**self).reset_input()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }
}

/// Splits a raw byte stream into trimmed, non-empty text lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    partial: Vec<u8>,
    lines: VecDeque<String>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes; complete lines become available immediately
    pub fn push(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if b == b'\n' {
                let raw = std::mem::take(&mut self.partial);
                let line = String::from_utf8_lossy(&raw).trim().to_string();
                if !line.is_empty() {
                    self.lines.push_back(line);
                }
            } else {
                self.partial.push(b);
            }
        }
    }

    pub fn pop_line(&mut self) -> Option<String> {
        self.lines.pop_front()
    }

    pub fn has_line(&self) -> bool {
        !self.lines.is_empty()
    }

    /// Whether any bytes, complete line or not, are buffered
    pub fn has_bytes(&self) -> bool {
        self.has_line() || !self.partial.is_empty()
    }

    pub fn clear(&mut self) {
        self.partial.clear();
        self.lines.clear();
    }
}

/// Read and return whatever the device prints within `window`.
///
/// Used right after opening the link to swallow boot banners.
pub fn drain_startup<T: Transport + ?Sized>(
    transport: &mut T,
    window: Duration,
) -> Result<Vec<String>, TransportError> {
    let deadline = Instant::now() + window;
    let mut lines = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match transport.read_line(remaining)? {
            Some(line) => {
                debug!("startup: {}", line);
                lines.push(line);
            }
            None => break,
        }
    }
    Ok(lines)
}

/// Give a freshly opened device time to reboot, then collect its banner.
///
/// Opening a serial port resets most microcontroller boards, and anything
/// written during the boot window is lost.
pub fn connect<T: Transport + ?Sized>(
    transport: &mut T,
    reset_wait: Duration,
    drain_window: Duration,
) -> Result<Vec<String>, TransportError> {
    if !reset_wait.is_zero() {
        info!("Waiting {}ms for device reset", reset_wait.as_millis());
        thread::sleep(reset_wait);
    }
    let lines = drain_startup(transport, drain_window)?;
    for line in &lines {
        info!("Device: {}", line);
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_buffer_splits_and_trims() {
        let mut buf = LineBuffer::new();
        buf.push(b"INPUT: 0x61\r\nKEY: a\r\n\r\nSCAN");
        assert_eq!(buf.pop_line().as_deref(), Some("INPUT: 0x61"));
        assert_eq!(buf.pop_line().as_deref(), Some("KEY: a"));
        assert_eq!(buf.pop_line(), None);
        assert!(buf.has_bytes());

        buf.push(b"CODE: 0x1C\n");
        assert_eq!(buf.pop_line().as_deref(), Some("SCANCODE: 0x1C"));
        assert!(!buf.has_bytes());
    }

    #[test]
    fn line_buffer_replaces_invalid_utf8() {
        let mut buf = LineBuffer::new();
        buf.push(b"ok \xff\n");
        let line = buf.pop_line().unwrap();
        assert!(line.starts_with("ok"));
    }

    #[test]
    fn line_buffer_clear_discards_partial() {
        let mut buf = LineBuffer::new();
        buf.push(b"one\ntwo");
        buf.clear();
        assert!(!buf.has_bytes());
        buf.push(b"\n");
        assert_eq!(buf.pop_line(), None);
    }

    #[test]
    fn drain_startup_collects_banner() {
        let mut transport = ScriptedTransport::silent().with_startup(&["arduXT v1.0", "Ready"]);
        let lines = drain_startup(&mut transport, Duration::from_millis(50)).unwrap();
        assert_eq!(lines, vec!["arduXT v1.0", "Ready"]);
    }

    #[test]
    fn connect_waits_then_drains() {
        let mut transport = ScriptedTransport::silent().with_startup(&["arduXT ready"]);
        let started = Instant::now();
        let lines = connect(&mut transport, Duration::from_millis(20), Duration::from_millis(20)).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(lines, vec!["arduXT ready"]);
    }
}
