//! Persistent configuration storage.

pub mod config;

pub use config::{load_config, save_config, AppConfig, ConfigError, DEFAULT_CONFIG_FILE};
