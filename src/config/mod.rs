//! Configuration management
//!
//! Handles loading, validation, and merging of configuration from:
//! - TOML files
//! - Environment variables (through clap)
//! - CLI arguments

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::input::Dialect;
use crate::preferences::{MAX_RATE, MIN_RATE};
use crate::scheduler::TypingRate;
use crate::transport::TargetId;

pub mod types;

pub use types::{CdpConfig, LoggingConfig, TypingConfig};

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// DevTools connection
    pub cdp: CdpConfig,
    /// Typing defaults
    #[serde(default)]
    pub typing: TypingConfig,
    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Default config file location (`<config_dir>/cdp-typist/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cdp-typist").join("config.toml"))
    }

    /// Create default configuration
    pub fn default_config() -> Self {
        Config {
            cdp: CdpConfig {
                endpoint: "ws://127.0.0.1:9222/devtools/browser".to_string(),
                command_timeout_ms: 5000,
                default_target: TargetId::FIRST.to_string(),
            },
            typing: TypingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.cdp.endpoint.starts_with("ws://") || self.cdp.endpoint.starts_with("wss://")) {
            anyhow::bail!(
                "Invalid DevTools endpoint (expected ws:// or wss://): {}",
                self.cdp.endpoint
            );
        }

        if self.cdp.command_timeout_ms == 0 {
            anyhow::bail!("command_timeout_ms must be greater than 0");
        }

        let rate = self.typing.default_rate;
        if !(MIN_RATE..=MAX_RATE).contains(&rate) {
            anyhow::bail!(
                "default_rate ({}) must be between {} and {}",
                rate,
                MIN_RATE,
                MAX_RATE
            );
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}", self.logging.level),
        }

        Ok(())
    }

    /// Override config with CLI arguments
    pub fn with_overrides(mut self, endpoint: Option<String>) -> Self {
        if let Some(endpoint) = endpoint {
            self.cdp.endpoint = endpoint;
        }
        self
    }

    /// Command timeout as a duration
    pub fn command_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.cdp.command_timeout_ms)
    }

    /// Target for requests that name none
    pub fn default_target(&self) -> TargetId {
        TargetId::new(self.cdp.default_target.clone())
    }

    /// Key event dialect
    pub fn dialect(&self) -> Dialect {
        if self.typing.legacy_key_codes {
            Dialect::Legacy
        } else {
            Dialect::Standard
        }
    }

    /// Configured default typing rate
    pub fn default_rate(&self) -> TypingRate {
        TypingRate::new(self.typing.default_rate).unwrap_or(TypingRate::DEFAULT)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
