//! Crate-level error taxonomy
//!
//! Per-transaction faults never show up here: the verifier folds them into an
//! [`Outcome`](crate::verify::Outcome). These are the errors that stop a run
//! before or after the transaction loop.

use crate::config::ConfigError;
use crate::transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// Invalid invocation or configuration, raised before any transaction
    #[error("usage error: {0}")]
    Usage(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The device did not announce itself after connecting
    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("failed to write report {path}: {source}")]
    Report {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, HarnessError>;
