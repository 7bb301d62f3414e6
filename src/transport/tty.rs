//! Serial TTY transport for Unix hosts
//!
//! Opens the port non-blocking, puts it in raw mode at the requested baud
//! rate and buffers incoming bytes into lines.

use super::{LineBuffer, Transport, TransportError};
use log::{debug, info};
use nix::libc;
use nix::sys::termios::{self, BaudRate, FlushArg, SetArg};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

const IDLE_SLEEP: Duration = Duration::from_millis(1);

fn baud_rate(rate: u32) -> Result<BaudRate, TransportError> {
    let baud = match rate {
        1200 => BaudRate::B1200,
        2400 => BaudRate::B2400,
        4800 => BaudRate::B4800,
        9600 => BaudRate::B9600,
        19200 => BaudRate::B19200,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        115200 => BaudRate::B115200,
        230400 => BaudRate::B230400,
        other => return Err(TransportError::UnsupportedBaud(other)),
    };
    Ok(baud)
}

/// A serial port opened in raw, non-blocking mode
pub struct TtyTransport {
    file: Option<File>,
    path: PathBuf,
    buffer: LineBuffer,
}

impl TtyTransport {
    /// Open `path` at `rate` baud
    pub fn open(path: impl AsRef<Path>, rate: u32) -> Result<Self, TransportError> {
        let path = path.as_ref().to_path_buf();
        let speed = baud_rate(rate)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(&path)?;

        let mut tio = termios::tcgetattr(&file)?;
        termios::cfmakeraw(&mut tio);
        termios::cfsetspeed(&mut tio, speed)?;
        termios::tcsetattr(&file, SetArg::TCSANOW, &tio)?;

        info!("Opened {} at {} baud", path.display(), rate);

        Ok(Self {
            file: Some(file),
            path,
            buffer: LineBuffer::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move everything the kernel has buffered into the line buffer
    fn fill(&mut self) -> Result<(), TransportError> {
        let file = self.file.as_mut().ok_or(TransportError::Closed)?;
        let mut chunk = [0u8; 256];
        loop {
            match file.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => self.buffer.push(&chunk[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl Transport for TtyTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let file = self.file.as_mut().ok_or(TransportError::Closed)?;
        let mut written = 0;
        while written < bytes.len() {
            match file.write(&bytes[written..]) {
                Ok(n) => written += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(IDLE_SLEEP),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        termios::tcdrain(&*file)?;
        Ok(())
    }

    fn has_data(&mut self) -> Result<bool, TransportError> {
        self.fill()?;
        Ok(self.buffer.has_bytes())
    }

    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.fill()?;
            if let Some(line) = self.buffer.pop_line() {
                return Ok(Some(line));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(IDLE_SLEEP);
        }
    }

    fn reset_input(&mut self) -> Result<(), TransportError> {
        let file = self.file.as_ref().ok_or(TransportError::Closed)?;
        termios::tcflush(file, FlushArg::TCIFLUSH)?;
        self.buffer.clear();
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.file.take().is_some() {
            info!("Closed {}", self.path.display());
        }
        Ok(())
    }
}

impl Drop for TtyTransport {
    fn drop(&mut self) {
        if self.file.is_some() {
            debug!("Releasing {} on drop", self.path.display());
            let _ = self.close();
        }
    }
}
