//! Single send/receive/classify cycle against the device
//!
//! The verifier never returns an error: every transport fault is captured
//! in the transaction as [`Outcome::TransportException`], so the campaign
//! loop can keep going no matter what the link does.

use crate::keys::{EncodedInput, Expectation};
use crate::transport::{Transport, TransportError};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

/// Terminal classification of one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    /// Nothing came back before the deadline
    Timeout,
    /// The device reported an error for an input expected to succeed
    UnexpectedResponse,
    /// The link itself failed during write or read
    TransportException,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        *self == Outcome::Success
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Timeout => "timeout",
            Self::UnexpectedResponse => "unexpected_response",
            Self::TransportException => "transport_exception",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Timing and marker settings for the verifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierSettings {
    /// Response window, measured from the write
    pub deadline: Duration,
    /// Pause after the write before the first poll
    pub settle: Duration,
    /// Sleep between polls when nothing is pending
    pub poll_interval: Duration,
    pub success_marker: String,
    pub error_marker: String,
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(1),
            settle: Duration::from_millis(2),
            poll_interval: Duration::from_millis(1),
            success_marker: "SCANCODE:".to_string(),
            error_marker: "ERROR:".to_string(),
        }
    }
}

/// One completed exchange
#[derive(Debug, Clone)]
pub struct Transaction {
    pub input: EncodedInput,
    pub outcome: Outcome,
    /// Wall time from just before the write to classification
    pub elapsed: Duration,
    pub lines: Vec<String>,
    /// What a passing response would have contained
    pub expected: String,
    /// Transport fault description, for [`Outcome::TransportException`]
    pub fault: Option<String>,
}

impl Transaction {
    pub fn response_text(&self) -> String {
        self.lines.join("\n")
    }

    /// What the device actually did, for failure records
    pub fn actual(&self) -> String {
        match self.outcome {
            Outcome::Timeout => "timeout".to_string(),
            Outcome::TransportException => self.fault.clone().unwrap_or_default(),
            Outcome::Success | Outcome::UnexpectedResponse => self.response_text(),
        }
    }
}

/// Drives one request/response cycle over a transport
#[derive(Debug, Clone, Default)]
pub struct TransactionVerifier {
    settings: VerifierSettings,
}

impl TransactionVerifier {
    pub fn new(settings: VerifierSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &VerifierSettings {
        &self.settings
    }

    /// Send `input` and classify whatever comes back
    pub fn verify<T: Transport + ?Sized>(&self, transport: &mut T, input: EncodedInput) -> Transaction {
        let mut lines = Vec::new();
        let mut started = Instant::now();

        let result = self.exchange(transport, &input.bytes, &mut lines, &mut started);
        let (outcome, fault) = match result {
            Ok(()) => (self.classify(input.expectation, &lines), None),
            Err(e) => (Outcome::TransportException, Some(e.to_string())),
        };
        let elapsed = started.elapsed();

        let expected = match input.expectation {
            Expectation::Scancode => self.settings.success_marker.clone(),
            Expectation::AnyResponse => "any response".to_string(),
        };

        let tx = Transaction {
            input,
            outcome,
            elapsed,
            lines,
            expected,
            fault,
        };

        match tx.outcome {
            Outcome::Success => debug!(
                "{} [{}] ok in {:.2}ms",
                tx.input.description,
                tx.input.hex(),
                elapsed.as_secs_f64() * 1000.0
            ),
            other => warn!(
                "{} [{}] failed: {} ({})",
                tx.input.description,
                tx.input.hex(),
                other,
                tx.actual().replace('\n', " | ")
            ),
        }

        tx
    }

    fn exchange<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        bytes: &[u8],
        lines: &mut Vec<String>,
        started: &mut Instant,
    ) -> Result<(), TransportError> {
        transport.reset_input()?;

        *started = Instant::now();
        transport.write(bytes)?;
        let deadline = *started + self.settings.deadline;

        if !self.settings.settle.is_zero() {
            thread::sleep(self.settings.settle);
        }

        loop {
            if transport.has_data()? {
                if let Some(line) = transport.read_line(self.settings.poll_interval)? {
                    let terminal = self.is_terminal(&line);
                    lines.push(line);
                    if terminal {
                        break;
                    }
                }
            } else {
                thread::sleep(self.settings.poll_interval);
            }

            if Instant::now() >= deadline {
                break;
            }
        }

        Ok(())
    }

    fn is_terminal(&self, line: &str) -> bool {
        line.contains(&self.settings.success_marker) || line.contains(&self.settings.error_marker)
    }

    fn classify(&self, expectation: Expectation, lines: &[String]) -> Outcome {
        if lines.is_empty() {
            return Outcome::Timeout;
        }
        let device_error = lines.iter().any(|l| l.contains(&self.settings.error_marker));
        if device_error && expectation == Expectation::Scancode {
            Outcome::UnexpectedResponse
        } else {
            Outcome::Success
        }
    }
}
