//! Read-only options a driver is constructed with.
//!
//! These values are built once (usually from the gateway's TOML file plus
//! command-line overrides) and passed by value into [`crate::Driver::new`].
//! Nothing in the driver mutates them afterwards.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use cbus_core::NumberBase;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default baud rate for USB CAN interfaces.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Which transport adapter backs the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    #[default]
    Serial,
    Tcp,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown driver {0:?} (expected \"serial\" or \"tcp\")")]
pub struct UnknownDriverKind(pub String);

impl FromStr for DriverKind {
    type Err = UnknownDriverKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serial" => Ok(DriverKind::Serial),
            "tcp" => Ok(DriverKind::Tcp),
            _ => Err(UnknownDriverKind(s.to_string())),
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverKind::Serial => f.write_str("serial"),
            DriverKind::Tcp => f.write_str("tcp"),
        }
    }
}

/// Behaviour switches read by applications that sit on top of the driver.
///
/// The driver itself only stores them; the gateway binary uses
/// `no_reconnect` to decide whether to retry after a drop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    #[serde(default)]
    pub no_feedback: bool,
    #[serde(default)]
    pub no_sync: bool,
    #[serde(default)]
    pub no_detectors: bool,
    #[serde(default)]
    pub no_reconnect: bool,
}

/// Construction-time configuration of a [`crate::Driver`].
#[derive(Debug, Clone, PartialEq)]
pub struct DriverOptions {
    pub kind: DriverKind,
    /// Radix used for `dump` lines in the logs.
    pub base: NumberBase,
    /// Serial line speed; ignored by the TCP adapter.
    pub baud_rate: u32,
    /// `host[:port]` entries offered as connection targets by the TCP adapter.
    pub ports: Vec<String>,
    /// Port to connect to at start-up, if any.
    pub autoconnect: Option<String>,
    /// Pause after each written frame.  Zero disables it.
    pub write_delay: Duration,
    pub flags: FeatureFlags,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            kind: DriverKind::default(),
            base: NumberBase::Hex,
            baud_rate: DEFAULT_BAUD_RATE,
            ports: Vec::new(),
            autoconnect: None,
            write_delay: Duration::ZERO,
            flags: FeatureFlags::default(),
        }
    }
}

/// Splits a comma-separated port list, trimming blanks and dropping empty entries.
pub fn parse_port_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
