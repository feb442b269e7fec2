//! TOML configuration file for the gateway binary.
//!
//! # Layout
//!
//! ```toml
//! [driver]
//! kind = "serial"            # or "tcp"
//! base = 16                  # radix of logged dumps: 16 or 10
//! baud_rate = 115200
//! ports = ["cbus-eth:5550"]  # host[:port] targets for the tcp driver
//! autoconnect = "/dev/ttyACM0"
//! write_delay_ms = 0
//! reconnect_interval_secs = 5
//! log_level = "info"
//!
//! [gateway]
//! enabled = true
//! bind_address = "0.0.0.0"
//! listen_port = 5550
//!
//! [flags]
//! no_feedback = false
//! no_sync = false
//! no_detectors = false
//! no_reconnect = false
//! ```
//!
//! Every field has a default, so a missing file, a missing section, or a
//! missing key all fall back to working values.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use cbus_core::NumberBase;
use cbus_driver::{DriverKind, DriverOptions, FeatureFlags};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{GatewayConfig, DEFAULT_LISTEN_PORT};

/// File looked for in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "cbusio.toml";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// `gateway.bind_address` is not an IP address.
    #[error("invalid gateway bind address {0:?}")]
    BindAddress(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub driver: DriverSection,
    #[serde(default)]
    pub gateway: GatewaySection,
    #[serde(default)]
    pub flags: FeatureFlags,
}

/// Bus connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverSection {
    #[serde(default)]
    pub kind: DriverKind,
    /// Radix of logged dumps.  Anything other than 10 means hexadecimal.
    #[serde(default = "default_base")]
    pub base: u32,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoconnect: Option<String>,
    #[serde(default)]
    pub write_delay_ms: u64,
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_secs: u64,
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Gateway listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewaySection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_base() -> u32 {
    16
}
fn default_baud_rate() -> u32 {
    cbus_driver::domain::config::DEFAULT_BAUD_RATE
}
fn default_reconnect_interval() -> u64 {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_listen_port() -> u16 {
    DEFAULT_LISTEN_PORT
}

impl Default for DriverSection {
    fn default() -> Self {
        Self {
            kind: DriverKind::default(),
            base: default_base(),
            baud_rate: default_baud_rate(),
            ports: Vec::new(),
            autoconnect: None,
            write_delay_ms: 0,
            reconnect_interval_secs: default_reconnect_interval(),
            log_level: default_log_level(),
        }
    }
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            bind_address: default_bind_address(),
            listen_port: default_listen_port(),
        }
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl AppConfig {
    /// Options the driver is constructed with.
    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            kind: self.driver.kind,
            base: NumberBase::from_radix(self.driver.base),
            baud_rate: self.driver.baud_rate,
            ports: self.driver.ports.clone(),
            autoconnect: self
                .driver
                .autoconnect
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            write_delay: Duration::from_millis(self.driver.write_delay_ms),
            flags: self.flags,
        }
    }

    /// Listener settings for the gateway.
    ///
    /// # Errors
    ///
    /// [`ConfigError::BindAddress`] if `bind_address` is not an IP address.
    pub fn gateway_config(&self) -> Result<GatewayConfig, ConfigError> {
        let ip: IpAddr = self
            .gateway
            .bind_address
            .trim()
            .parse()
            .map_err(|_| ConfigError::BindAddress(self.gateway.bind_address.clone()))?;
        Ok(GatewayConfig::new(SocketAddr::new(ip, self.gateway.listen_port)))
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.driver.reconnect_interval_secs.max(1))
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
