//! Configuration management for benchcmd.
//!
//! Configuration is loaded from `~/.config/benchcmd/config.toml`.

use crate::transport::TransportOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Catalog file looked up in the working directory when nothing else is set.
pub const DEFAULT_CATALOG_FILE: &str = "COMMANDS.txt";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Instrument connection defaults.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Command catalog location.
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Connection defaults, editable later in the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Instrument host name or IP address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Instrument port (default: 5025, the SCPI raw socket port).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Append `\n` to commands that don't end with one.
    #[serde(default = "default_true")]
    pub auto_newline: bool,
    /// Resolve + connect limit in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// How long to wait for a reply in milliseconds.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            auto_newline: true,
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl ConnectionConfig {
    /// Timeouts for the transport.
    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
        }
    }
}

fn default_host() -> String {
    "169.254.156.89".to_string()
}

fn default_port() -> u16 {
    5025
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

fn default_read_timeout_ms() -> u64 {
    100
}

/// Where to find the command catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Explicit catalog path. Falls back to `COMMANDS.txt` in the working
    /// directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Config {
    /// Get the config directory path.
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("benchcmd"))
            .context("Could not determine config directory")
    }

    /// Get the config file path.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Get the log file path used while the terminal UI owns the screen.
    pub fn log_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("benchcmd.log"))
    }

    /// Load configuration from file, using defaults if not found.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, using defaults if not found.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Resolve the catalog path: explicit override, then config, then the
    /// working directory.
    pub fn catalog_path(&self, override_path: Option<&Path>) -> PathBuf {
        override_path
            .map(Path::to_path_buf)
            .or_else(|| self.catalog.path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CATALOG_FILE))
    }
}
