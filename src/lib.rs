//! Keystroke Harness - fuzz and assertion testing for serial keyboard converters
//!
//! Drives a device that turns terminal keystrokes (raw bytes, control codes,
//! SS3 and CSI escape sequences) into keyboard scancodes. Inputs are encoded
//! from a static key catalog, sent one at a time over a serial link, and
//! classified by what the device prints back.

pub mod campaign;
pub mod config;
pub mod error;
pub mod keys;
pub mod report;
pub mod stats;
pub mod suite;
pub mod transport;
pub mod utils;
pub mod verify;

pub use campaign::{CampaignSettings, CampaignState, CancelFlag, FuzzCampaign, StopCondition};
pub use config::Config;
pub use error::{HarnessError, Result};
pub use keys::{KeystrokeEncoder, KeystrokeGenerator, ModifierSet};
pub use report::{FailureLog, RunInfo, RunReport};
pub use stats::RunStatistics;
pub use transport::{Transport, TransportError};
pub use verify::{Outcome, TransactionVerifier, VerifierSettings};
