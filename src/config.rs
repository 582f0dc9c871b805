//! Host configuration loading.
//!
//! The configuration file is located at `~/.contty/config.toml`:
//!
//! ```toml
//! # Output transform: raw, strip, humanize
//! mode = "strip"
//!
//! # Console grid size
//! width = 120
//! height = 30
//!
//! # Mirror the untransformed byte stream to a file
//! capture = "C:\\temp\\session.bin"
//! ```
//!
//! Command-line flags override file values; a missing or unparsable file
//! falls back to the defaults.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Transform applied to mirrored output chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// Forward the byte stream untouched.
    #[default]
    Raw,
    /// Remove recognized escape sequences.
    Strip,
    /// Replace recognized escape sequences with readable tags.
    Humanize,
}

/// Host configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default output transform.
    pub mode: OutputMode,
    /// Console grid width.
    pub width: i16,
    /// Console grid height.
    pub height: i16,
    /// Default raw-capture file; `None` disables capture.
    pub capture: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: OutputMode::Raw,
            width: 80,
            height: 24,
            capture: None,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults.
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                if let Ok(content) = fs::read_to_string(&path) {
                    if let Ok(config) = toml::from_str(&content) {
                        return config;
                    }
                }
            }
        }
        Self::default()
    }

    /// Get config file path
    fn config_path() -> Option<PathBuf> {
        Some(dot_dir()?.join("config.toml"))
    }
}

/// `~/.contty`, created on first use.
pub fn dot_dir() -> Option<PathBuf> {
    let dir = home_dir()?.join(".contty");
    if !dir.exists() {
        let _ = fs::create_dir_all(&dir);
    }
    Some(dir)
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_raw_80x24() {
        let config = Config::default();
        assert_eq!(config.mode, OutputMode::Raw);
        assert_eq!((config.width, config.height), (80, 24));
        assert!(config.capture.is_none());
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let config: Config = toml::from_str("mode = \"humanize\"").expect("parse");
        assert_eq!(config.mode, OutputMode::Humanize);
        assert_eq!(config.width, 80);
    }
}
