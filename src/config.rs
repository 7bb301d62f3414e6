//! Configuration management for the keystroke harness
//!
//! Settings are read from a TOML file. Command-line flags override whatever
//! the file provides; every section falls back to its defaults when absent.
//!
//! ## Config File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/keystroke-harness/config.toml` |
//! | macOS | `~/Library/Application Support/keystroke-harness/config.toml` |
//! | Windows | `%APPDATA%\keystroke-harness\config.toml` |
//!
//! ## Example
//!
//! ```no_run
//! use keystroke_harness::Config;
//!
//! let mut config = Config::load().unwrap_or_default();
//! config.verify.timeout_ms = 500;
//! config.save().expect("Failed to save config");
//! ```

use crate::keys::{FamilyWeights, ModifierPolicy, StrategyKind};
use crate::verify::VerifierSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("config IO error: {0}")]
    Io(#[from] io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    /// A value parsed but makes no sense
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Returns the path to the config file, creating its directory if needed.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    let app_dir = config_dir.join("keystroke-harness");

    if !app_dir.exists() {
        fs::create_dir_all(&app_dir)?;
    }

    Ok(app_dir.join("config.toml"))
}

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub verify: VerifyConfig,
    #[serde(default)]
    pub campaign: CampaignConfig,
    /// Family weights of the weighted strategy
    #[serde(default)]
    pub weights: FamilyWeights,
    /// Modifier parameter arithmetic
    #[serde(default)]
    pub modifiers: ModifierPolicy,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub suite: SuiteConfig,
}

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub baud_rate: u32,
    /// Wait after opening the port while the device resets
    pub reset_wait_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            reset_wait_ms: 2000,
        }
    }
}

/// Verifier timing and response markers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    pub timeout_ms: u64,
    pub settle_ms: u64,
    pub poll_interval_ms: u64,
    pub success_marker: String,
    pub error_marker: String,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 1000,
            settle_ms: 2,
            poll_interval_ms: 1,
            success_marker: "SCANCODE:".to_string(),
            error_marker: "ERROR:".to_string(),
        }
    }
}

/// Campaign loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    pub strategy: StrategyKind,
    pub delay_ms: u64,
    /// Upper bound of the random extra pause after each input
    pub delay_jitter_ms: u64,
    pub progress_every: u64,
    /// Share of malformed inputs in the uniform strategy
    pub malformed_share: f64,
    pub seed: Option<u64>,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Weighted,
            delay_ms: 0,
            delay_jitter_ms: 10,
            progress_every: 10,
            malformed_share: 0.05,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Failures embedded in the run report
    pub recent_failures: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            recent_failures: 100,
        }
    }
}

/// Assertion suite settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Text the device prints on startup
    pub banner: String,
    /// Quiet period that ends a response
    pub idle_timeout_ms: u64,
    /// Gap between characters of typed input
    pub char_gap_ms: u64,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            banner: "arduXT".to_string(),
            idle_timeout_ms: 300,
            char_gap_ms: 10,
        }
    }
}

impl Config {
    /// Load configuration from the default config file.
    ///
    /// Returns the default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default config file.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = config_path()?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Reject values that would make a run meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.verify.timeout_ms == 0 {
            return Err(ConfigError::Invalid("verify.timeout_ms must be positive".into()));
        }
        if self.verify.success_marker.is_empty() || self.verify.error_marker.is_empty() {
            return Err(ConfigError::Invalid("response markers must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.campaign.malformed_share) {
            return Err(ConfigError::Invalid(format!(
                "campaign.malformed_share {} is outside 0..=1",
                self.campaign.malformed_share
            )));
        }
        Ok(())
    }

    pub fn verifier_settings(&self) -> VerifierSettings {
        VerifierSettings {
            deadline: Duration::from_millis(self.verify.timeout_ms),
            settle: Duration::from_millis(self.verify.settle_ms),
            poll_interval: Duration::from_millis(self.verify.poll_interval_ms.max(1)),
            success_marker: self.verify.success_marker.clone(),
            error_marker: self.verify.error_marker.clone(),
        }
    }

    pub fn reset_wait(&self) -> Duration {
        Duration::from_millis(self.transport.reset_wait_ms)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.campaign.delay_ms)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.campaign.delay_jitter_ms)
    }
}
