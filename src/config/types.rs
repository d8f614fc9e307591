//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// DevTools connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CdpConfig {
    /// Browser-level DevTools WebSocket URL
    /// (e.g., "ws://127.0.0.1:9222/devtools/browser/<id>")
    pub endpoint: String,

    /// Upper bound for any single DevTools command, in milliseconds
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Target used when a request names none ("first" = first page)
    #[serde(default = "default_target")]
    pub default_target: String,
}

fn default_command_timeout_ms() -> u64 {
    5000
}

fn default_target() -> String {
    "first".to_string()
}

/// Typing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingConfig {
    /// Characters per second when neither the request nor the saved
    /// preference sets one
    #[serde(default = "default_rate")]
    pub default_rate: f64,

    /// Attach windowsVirtualKeyCode/nativeVirtualKeyCode to key events
    #[serde(default = "default_legacy_key_codes")]
    pub legacy_key_codes: bool,
}

fn default_rate() -> f64 {
    40.0
}

fn default_legacy_key_codes() -> bool {
    true
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            default_rate: default_rate(),
            legacy_key_codes: default_legacy_key_codes(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level ("trace", "debug", "info", "warn", "error")
    pub level: String,

    /// Directory for a log file in addition to stderr
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}
