//! Configuration loading for the bridge.
//!
//! Configuration is loaded from a TOML file passed to `bridge_init`, or from
//! `$UPLINK_BRIDGE_CONFIG` when the bridge is created lazily.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use bridge_types::UplinkConfig;

/// Environment variable naming the config file for lazy initialization.
pub const CONFIG_ENV: &str = "UPLINK_BRIDGE_CONFIG";

/// Root configuration for the bridge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BridgeConfig {
    /// Handle registry configuration.
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Defaults for uplink clients.
    #[serde(default)]
    pub uplink: UplinkDefaults,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Handle registry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegistryConfig {
    /// Maximum live handles (default: 1048576).
    #[serde(default = "default_max_handles")]
    pub max_handles: usize,
}

/// Values applied to zero fields of an `UplinkConfig`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UplinkDefaults {
    /// Dial timeout in seconds (default: 20).
    #[serde(default = "default_timeout_secs")]
    pub dial_timeout_secs: u64,
    /// Request timeout in seconds (default: 20).
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Largest inline segment in bytes (default: 4KB).
    #[serde(default = "default_max_inline_size")]
    pub max_inline_size: u64,
    /// Upload memory budget in bytes (default: 4MB).
    #[serde(default = "default_max_memory")]
    pub max_memory: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset (default: "info").
    #[serde(default = "default_filter")]
    pub filter: String,
}

// Default value functions
fn default_max_handles() -> usize {
    bridge_core::DEFAULT_CAPACITY
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_max_inline_size() -> u64 {
    4 * 1024 // 4KB
}

fn default_max_memory() -> u64 {
    4 * 1024 * 1024 // 4MB
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_handles: default_max_handles(),
        }
    }
}

impl Default for UplinkDefaults {
    fn default() -> Self {
        Self {
            dial_timeout_secs: default_timeout_secs(),
            request_timeout_secs: default_timeout_secs(),
            max_inline_size: default_max_inline_size(),
            max_memory: default_max_memory(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

impl UplinkDefaults {
    /// Replace zero-valued fields of `config` with these defaults.
    ///
    /// A defaulted size never conflicts with a size the caller set: the
    /// inline default is capped at the caller's memory budget and the memory
    /// default is raised to the caller's inline size.
    pub fn apply(&self, config: &UplinkConfig) -> UplinkConfig {
        let or = |value: u64, fallback: u64| if value == 0 { fallback } else { value };
        let max_memory = or(
            config.max_memory,
            self.max_memory.max(config.max_inline_size),
        );
        UplinkConfig {
            max_inline_size: or(config.max_inline_size, self.max_inline_size.min(max_memory)),
            max_memory,
            dial_timeout_ms: or(
                config.dial_timeout_ms,
                self.dial_timeout_secs.saturating_mul(1000),
            ),
            request_timeout_ms: or(
                config.request_timeout_ms,
                self.request_timeout_secs.saturating_mul(1000),
            ),
            ..config.clone()
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load from `$UPLINK_BRIDGE_CONFIG` if set, else defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::from_file(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
}

impl From<ConfigError> for bridge_types::BridgeError {
    fn from(e: ConfigError) -> Self {
        bridge_types::BridgeError::InvalidConfig(e.to_string())
    }
}
