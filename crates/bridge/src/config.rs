//! Bridge configuration management

use anyhow::{Context, Result, anyhow};
use common::DEFAULT_FRAME_QUEUE_CAPACITY;
use protocol::DEFAULT_READ_CHUNK_SIZE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Largest accepted bulk IN chunk size
pub const MAX_READ_CHUNK_SIZE: usize = 65536;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub bridge: BridgeSettings,
    #[serde(default)]
    pub usb: UsbSettings,
    #[serde(default)]
    pub transport: TransportSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    #[serde(default = "BridgeSettings::default_log_level")]
    pub log_level: String,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

impl BridgeSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

/// Interface selection and transfer timeouts
///
/// Timeouts of zero wait forever. The read poll interval only bounds how long a
/// closed session takes to stop its read loop; it never fails a read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbSettings {
    #[serde(default)]
    pub interface: u8,
    #[serde(default)]
    pub alt_setting: u8,
    #[serde(default)]
    pub control_timeout_ms: u64,
    #[serde(default)]
    pub write_timeout_ms: u64,
    #[serde(default = "UsbSettings::default_read_poll_ms")]
    pub read_poll_ms: u64,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            interface: 0,
            alt_setting: 0,
            control_timeout_ms: 0,
            write_timeout_ms: 0,
            read_poll_ms: Self::default_read_poll_ms(),
        }
    }
}

impl UsbSettings {
    fn default_read_poll_ms() -> u64 {
        100
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    /// Maximum bytes requested per bulk IN transfer
    #[serde(default = "TransportSettings::default_read_chunk_size")]
    pub read_chunk_size: usize,
    /// Frames buffered before the read loop waits for the consumer
    #[serde(default = "TransportSettings::default_frame_queue_capacity")]
    pub frame_queue_capacity: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            read_chunk_size: Self::default_read_chunk_size(),
            frame_queue_capacity: Self::default_frame_queue_capacity(),
        }
    }
}

impl TransportSettings {
    fn default_read_chunk_size() -> usize {
        DEFAULT_READ_CHUNK_SIZE
    }

    fn default_frame_queue_capacity() -> usize {
        DEFAULT_FRAME_QUEUE_CAPACITY
    }
}

impl BridgeConfig {
    /// Load configuration from the specified path
    ///
    /// Without a path the standard locations are tried in order. `~` in an explicit
    /// path is expanded.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            expand_path(&p)
        } else {
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/elm-usb/bridge.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", config_path.display()))?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Parse and validate TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: BridgeConfig =
            toml::from_str(content).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("elm-usb").join("bridge.toml")
        } else {
            PathBuf::from(".config/elm-usb/bridge.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        validate_log_level(&self.bridge.log_level)?;

        let chunk = self.transport.read_chunk_size;
        if !(1..=MAX_READ_CHUNK_SIZE).contains(&chunk) {
            return Err(anyhow!(
                "Invalid read_chunk_size {}, must be between 1 and {}",
                chunk,
                MAX_READ_CHUNK_SIZE
            ));
        }

        if self.transport.frame_queue_capacity == 0 {
            return Err(anyhow!("frame_queue_capacity must be greater than 0"));
        }

        if self.usb.read_poll_ms == 0 {
            return Err(anyhow!("read_poll_ms must be greater than 0"));
        }

        Ok(())
    }
}

/// Check a log level name accepted by `--log-level` and `[bridge] log_level`
pub fn validate_log_level(level: &str) -> Result<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&level) {
        return Err(anyhow!(
            "Invalid log level '{}', must be one of: {}",
            level,
            valid_levels.join(", ")
        ));
    }
    Ok(())
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}
