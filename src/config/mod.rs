//! Configuration module
//!
//! Handles loading and saving the backend configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::network::NetworkConfig;
use crate::protocol::DEFAULT_PORT;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Listener settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Demo backend settings
    #[serde(default)]
    pub demo: DemoConfig,
}

/// Listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Interface to bind to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Capacity of the server event channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
    /// Frames queued per GUI connection before senders wait
    #[serde(default = "default_send_channel_capacity")]
    pub send_channel_capacity: usize,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_event_channel_capacity() -> usize {
    256
}

fn default_send_channel_capacity() -> usize {
    256
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            event_channel_capacity: default_event_channel_capacity(),
            send_channel_capacity: default_send_channel_capacity(),
        }
    }
}

impl ServerConfig {
    /// Network settings for this listener, with the port overridden
    pub fn network_config(&self, port: u16) -> NetworkConfig {
        NetworkConfig::new(port)
            .with_bind_address(self.bind_address.clone())
            .with_event_channel_capacity(self.event_channel_capacity)
            .with_send_channel_capacity(self.send_channel_capacity)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive handed to the subscriber, e.g. "info" or "openpipes=debug"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Demo backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Answer GUI requests from the in-memory catalogue
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Push the canned topology to every GUI that connects
    #[serde(default = "default_true")]
    pub announce_topology: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            announce_topology: true,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        for path in Self::default_paths().iter() {
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Locations searched by `load_default`, in order
    pub fn default_paths() -> Vec<PathBuf> {
        [
            dirs::config_dir().map(|p| p.join("openpipes/config.toml")),
            Some(PathBuf::from("./openpipes.toml")),
            Some(PathBuf::from("./config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> ConfigResult<String> {
    let config = Config {
        server: ServerConfig {
            bind_address: "127.0.0.1".to_string(),
            ..Default::default()
        },
        logging: LoggingConfig {
            level: "openpipes=debug,info".to_string(),
        },
        ..Default::default()
    };

    Ok(toml::to_string_pretty(&config)?)
}
