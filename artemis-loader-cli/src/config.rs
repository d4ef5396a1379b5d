//! Configuration file support for the CLI.
//!
//! Configuration is loaded from multiple sources with the following priority
//! (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (`ARTEMIS_PORT`, `ARTEMIS_BAUD`)
//! 3. Local config file (`./artemis-loader.toml`)
//! 4. Global config file (`~/.config/artemis-loader/config.toml`)

use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Remembered connection preferences.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Preferred serial port (e.g. `/dev/ttyUSB0` or `COM3`).
    #[serde(default)]
    pub port: Option<String>,
    /// Preferred baud rate.
    #[serde(default)]
    pub baud: Option<u32>,
}

impl Config {
    /// Load configuration from all available sources, local overriding global.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        if let Some(local_config) = Self::load_from_file(Path::new("artemis-loader.toml")) {
            debug!("Loaded local config from artemis-loader.toml");
            config.merge(local_config);
        }

        config
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Global configuration directory (`~/.config/artemis-loader` on Linux).
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "artemis-loader").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    fn merge(&mut self, other: Self) {
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.baud.is_some() {
            self.baud = other.baud;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.port.is_none());
        assert!(config.baud.is_none());
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config::default();
        let other = Config {
            port: Some("/dev/ttyUSB0".to_string()),
            baud: Some(115200),
        };

        base.merge(other);

        assert_eq!(base.port, Some("/dev/ttyUSB0".to_string()));
        assert_eq!(base.baud, Some(115200));
    }

    #[test]
    fn test_config_merge_keeps_existing_when_other_unset() {
        let mut base = Config {
            port: Some("/dev/ttyUSB0".to_string()),
            baud: Some(115200),
        };
        base.merge(Config::default());

        assert_eq!(base.port, Some("/dev/ttyUSB0".to_string()));
        assert_eq!(base.baud, Some(115200));
    }
}
