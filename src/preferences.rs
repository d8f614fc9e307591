//! Typing-rate preference
//!
//! The one value that survives restarts: how fast to type, in characters per
//! second, clamped to [`MIN_RATE`]..=[`MAX_RATE`]. Stored as a small TOML
//! file next to the configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::scheduler::TypingRate;

/// Slowest accepted rate
pub const MIN_RATE: f64 = 1.0;
/// Fastest accepted rate
pub const MAX_RATE: f64 = 200.0;

/// Persisted preferences
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// Characters per second
    pub rate: f64,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            rate: TypingRate::DEFAULT.get(),
        }
    }
}

/// Clamp `rate` into the accepted range; non-numbers fall back to the default
pub fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        return TypingRate::DEFAULT.get();
    }
    rate.clamp(MIN_RATE, MAX_RATE)
}

impl Preferences {
    /// Default preference file (`<config_dir>/cdp-typist/preferences.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cdp-typist").join("preferences.toml"))
    }

    /// Load preferences, falling back to defaults when the file is absent
    /// or unreadable
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No preferences at {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match toml::from_str::<Preferences>(&content) {
            Ok(prefs) => Self {
                rate: clamp_rate(prefs.rate),
            },
            Err(e) => {
                warn!("Ignoring malformed preferences {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Write preferences, clamping the rate and creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let clamped = Self {
            rate: clamp_rate(self.rate),
        };
        let content = toml::to_string(&clamped).context("Failed to encode preferences")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write preferences: {}", path.display()))?;

        debug!("Saved typing rate {} to {}", clamped.rate, path.display());
        Ok(())
    }

    /// The preferred rate as a [`TypingRate`]
    pub fn typing_rate(&self) -> TypingRate {
        TypingRate::new(clamp_rate(self.rate)).unwrap_or(TypingRate::DEFAULT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_rate() {
        assert_eq!(clamp_rate(0.0), 1.0);
        assert_eq!(clamp_rate(-3.0), 1.0);
        assert_eq!(clamp_rate(75.5), 75.5);
        assert_eq!(clamp_rate(1000.0), 200.0);
        assert_eq!(clamp_rate(f64::INFINITY), 200.0);
        assert_eq!(clamp_rate(f64::NAN), 40.0);
    }

    #[test]
    fn test_missing_file_gives_default() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Preferences::load(&dir.path().join("absent.toml"));
        assert_eq!(prefs.rate, 40.0);
    }

    #[test]
    fn test_save_clamps_and_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("preferences.toml");

        Preferences { rate: 900.0 }.save(&path).unwrap();

        assert_eq!(Preferences::load(&path).rate, 200.0);
    }

    #[test]
    fn test_load_clamps_hand_edited_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.toml");
        std::fs::write(&path, "rate = 0.25\n").unwrap();

        assert_eq!(Preferences::load(&path).rate, 1.0);
        assert_eq!(Preferences::load(&path).typing_rate().get(), 1.0);
    }

    #[test]
    fn test_malformed_file_gives_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.toml");
        std::fs::write(&path, "rate = \"fast\"\n").unwrap();

        assert_eq!(Preferences::load(&path), Preferences::default());
    }
}
