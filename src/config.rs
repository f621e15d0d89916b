//! # Configuration Management
//!
//! Centralized configuration for the game server.
//!
//! Settings are grouped into the listener (`server`), the world loop and arena (`world`), the
//! handshake parameters (`protocol`) and `logging`. Every section has defaults matching the
//! revision 578 client, so an empty file is a valid configuration.
//!
//! ## Configuration Sources
//! - TOML files via [`ServerSettings::from_file`]
//! - TOML strings via [`ServerSettings::from_toml`]
//! - `RT5_*` environment variables via [`ServerSettings::from_env`]
//!
//! ## Example
//! ```toml
//! [server]
//! address = "0.0.0.0:43594"
//! read_timeout = 30000
//!
//! [world]
//! tick_interval = 600
//! max_players = 2000
//! ```

use crate::error::{ProtocolError, Result};
use crate::utils::rsa::{RsaKeyPair, DEFAULT_MODULUS, DEFAULT_PRIVATE_EXPONENT};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// Client revision the server speaks.
pub const CLIENT_VERSION: u32 = 578;

/// Bytes reserved per player in each arena.
pub const SLOT_SIZE: usize = 30_000;

/// Player slots available in the world registry.
pub const MAX_PLAYERS: usize = 2046;

/// Packets of one opcode accepted per player per tick.
pub const PER_OPCODE_CAP: u8 = 10;

/// Per-connection socket read buffer.
pub const READ_BUFFER_SIZE: usize = 65_536;

/// Unwritten chunks a connection may hold; one reply per 4-byte file request in a full read.
pub const OUTBOX_CAPACITY: usize = READ_BUFFER_SIZE / 4;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ServerSettings {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub world: WorldConfig,

    #[serde(default)]
    pub protocol: ProtocolConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServerSettings {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load defaults, then apply `RT5_*` environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from a variable lookup; unparseable values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("RT5_SERVER_ADDRESS") {
            self.server.address = addr;
        }

        if let Some(val) = lookup("RT5_READ_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.server.read_timeout = Some(Duration::from_millis(val));
        }

        if let Some(val) = lookup("RT5_WRITE_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.server.write_timeout = Some(Duration::from_millis(val));
        }

        if let Some(val) = lookup("RT5_OUTBOX_CAPACITY").and_then(|v| v.parse::<usize>().ok()) {
            self.server.outbox_capacity = val;
        }

        if let Some(val) = lookup("RT5_TICK_INTERVAL_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.world.tick_interval = Duration::from_millis(val);
        }

        if let Some(val) = lookup("RT5_MAX_PLAYERS").and_then(|v| v.parse::<usize>().ok()) {
            self.world.max_players = val;
        }

        if let Some(val) = lookup("RT5_CLIENT_VERSION").and_then(|v| v.parse::<u32>().ok()) {
            self.protocol.client_version = val;
        }

        if let Some(root) = lookup("RT5_ASSET_ROOT") {
            self.protocol.asset_root = PathBuf::from(root);
        }

        if let Some(path) = lookup("RT5_MAP_KEYS_PATH") {
            self.protocol.map_keys_path = PathBuf::from(path);
        }

        if let Some(level) = lookup("RT5_LOG_LEVEL").and_then(|v| v.parse::<Level>().ok()) {
            self.logging.log_level = level;
        }
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.world.validate());
        errors.extend(self.protocol.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:43594")
    pub address: String,

    /// Deadline for each socket read; `None` waits indefinitely
    #[serde(with = "opt_duration_serde")]
    pub read_timeout: Option<Duration>,

    /// Deadline for each socket write; `None` waits indefinitely
    #[serde(with = "opt_duration_serde")]
    pub write_timeout: Option<Duration>,

    /// Bound on a graceful shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// Per-connection socket read buffer in bytes
    pub read_buffer_size: usize,

    /// Chunks queued for a connection before it is closed as not reading
    pub outbox_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from("0.0.0.0:43594"),
            read_timeout: None,
            write_timeout: None,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
            read_buffer_size: READ_BUFFER_SIZE,
            outbox_capacity: OUTBOX_CAPACITY,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:43594')",
                self.address
            ));
        }

        for (name, value) in [("Read", self.read_timeout), ("Write", self.write_timeout)] {
            if let Some(value) = value {
                if value.as_millis() < 100 {
                    errors.push(format!("{name} timeout too short (minimum: 100ms)"));
                }
            }
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        if self.read_buffer_size < 5000 {
            errors.push(format!(
                "Read buffer too small: {} bytes (minimum: 5000)",
                self.read_buffer_size
            ));
        }

        if self.outbox_capacity == 0 {
            errors.push("Outbox capacity must be greater than 0".to_string());
        }

        errors
    }
}

/// World loop and arena configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Fixed interval between ticks
    #[serde(with = "duration_serde")]
    pub tick_interval: Duration,

    /// Bytes per player slot in each arena
    pub slot_size: usize,

    /// Number of player slots
    pub max_players: usize,

    /// Packets of one opcode accepted per player per tick
    pub per_opcode_cap: u8,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            tick_interval: timeout::TICK_INTERVAL,
            slot_size: SLOT_SIZE,
            max_players: MAX_PLAYERS,
            per_opcode_cap: PER_OPCODE_CAP,
        }
    }
}

impl WorldConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.tick_interval.is_zero() {
            errors.push("Tick interval must be greater than 0".to_string());
        } else if self.tick_interval.as_secs() > 10 {
            errors.push("Tick interval too long (maximum: 10s)".to_string());
        }

        if !(5000..=65_535).contains(&self.slot_size) {
            errors.push(format!(
                "Slot size out of range: {} (valid range: 5000-65535)",
                self.slot_size
            ));
        }

        if self.max_players == 0 {
            errors.push("Max players must be greater than 0".to_string());
        } else if self.max_players > MAX_PLAYERS {
            errors.push(format!(
                "Max players too high: {} (maximum: {MAX_PLAYERS})",
                self.max_players
            ));
        }

        if self.per_opcode_cap == 0 {
            errors.push("Per-opcode cap must be greater than 0".to_string());
        }

        errors
    }
}

/// Handshake and asset configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Client revision accepted by file-update and login handshakes
    pub client_version: u32,

    /// Root of the `<archive>/<group>.dat` asset tree
    pub asset_root: PathBuf,

    /// JSON file of map-square XTEA keys
    pub map_keys_path: PathBuf,

    /// Login RSA modulus, hexadecimal
    pub rsa_modulus: String,

    /// Login RSA private exponent, hexadecimal
    pub rsa_private_exponent: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            client_version: CLIENT_VERSION,
            asset_root: PathBuf::from("data/cache"),
            map_keys_path: PathBuf::from("data/xteas.json"),
            rsa_modulus: DEFAULT_MODULUS.to_string(),
            rsa_private_exponent: DEFAULT_PRIVATE_EXPONENT.to_string(),
        }
    }
}

impl ProtocolConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.client_version == 0 {
            errors.push("Client version must be greater than 0".to_string());
        }

        if let Err(e) = self.rsa_key() {
            errors.push(format!("Invalid RSA key: {e}"));
        }

        errors
    }

    /// Build the login keypair from the configured hex strings.
    pub fn rsa_key(&self) -> Result<RsaKeyPair> {
        RsaKeyPair::from_hex(&self.rsa_modulus, &self.rsa_private_exponent, None)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("rt5-server"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Optional durations; zero means no deadline
mod opt_duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.map(|d| d.as_millis() as u64).unwrap_or(0);
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok((millis > 0).then(|| Duration::from_millis(millis)))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
