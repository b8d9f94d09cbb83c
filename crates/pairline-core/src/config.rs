//! Configuration system for Pairline
//!
//! Every field has a default, so a partial (or missing) TOML file is fine.
//! The file is looked up in the platform config directory:
//! - macOS: ~/Library/Application Support/pairline/config.toml
//! - Linux: ~/.config/pairline/config.toml
//! - Windows: %APPDATA%/pairline/config.toml

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ids::ROOM_CODE_LENGTH;

/// Relay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener and room settings
    pub signal: SignalConfig,
    /// Liveness probe settings
    pub heartbeat: HeartbeatConfig,
}

/// Listener and room settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Signal server port
    pub port: u16,
    /// Bind address
    pub bind: IpAddr,
    /// HTML page served at `/` (built-in page if None)
    pub static_file: Option<PathBuf>,
    /// Length of generated room codes
    pub room_code_length: usize,
    /// Longest room id a client may choose, in bytes
    pub max_room_id_length: usize,
    /// How long shutdown waits for connections to close
    pub shutdown_grace_secs: u64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            port: crate::DEFAULT_PORT,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            static_file: None,
            room_code_length: ROOM_CODE_LENGTH,
            max_room_id_length: crate::MAX_ROOM_ID_LENGTH,
            shutdown_grace_secs: crate::DEFAULT_SHUTDOWN_GRACE_SECS,
        }
    }
}

impl SignalConfig {
    /// Socket address to listen on
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Heartbeat configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Probe period in seconds; a peer silent for two periods is evicted
    pub interval_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: crate::DEFAULT_HEARTBEAT_INTERVAL_SECS,
        }
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Config {
    /// Load from the platform config directory, falling back to defaults
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path).unwrap_or_else(|e| {
                warn!("Failed to load config from {:?}: {}, using defaults", path, e);
                Self::default()
            }),
            None => {
                debug!("No config directory found, using defaults");
                Self::default()
            }
        }
    }

    /// Load and validate a specific file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Reject values the relay cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signal.room_code_length == 0 {
            return Err(ConfigError::Invalid(
                "signal.room_code_length must be at least 1".into(),
            ));
        }
        if self.signal.max_room_id_length < self.signal.room_code_length {
            return Err(ConfigError::Invalid(
                "signal.max_room_id_length must not be shorter than signal.room_code_length".into(),
            ));
        }
        if self.heartbeat.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "heartbeat.interval_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// `config.toml` inside the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "pairline", "pairline")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Default configuration rendered as TOML
    pub fn sample() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

/// Configuration errors
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// I/O error
    Io(String),
    /// Parse error
    Parse(String),
    /// A value is out of range
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "I/O error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Invalid(e) => write!(f, "Invalid config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.signal.port, 8080);
        assert_eq!(config.signal.room_code_length, 6);
        assert_eq!(config.heartbeat.interval(), Duration::from_secs(30));
        assert_eq!(config.signal.socket_addr().to_string(), "0.0.0.0:8080");
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
            [heartbeat]
            interval_secs = 10
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.heartbeat.interval_secs, 10);
        // Other values should be defaults
        assert_eq!(config.signal.port, 8080);
    }

    #[test]
    fn test_sample_config() {
        let sample = Config::sample();
        assert!(sample.contains("[signal]"));
        assert!(sample.contains("[heartbeat]"));
    }

    #[test]
    fn test_config_load_missing() {
        let config = Config::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.signal.port, 8080); // Should use defaults
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[signal]\nport = 9001\nbind = \"127.0.0.1\"\nshutdown_grace_secs = 2\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.signal.socket_addr().to_string(), "127.0.0.1:9001");
        assert_eq!(config.signal.shutdown_grace(), Duration::from_secs(2));
    }

    #[test]
    fn test_config_rejects_zero_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[heartbeat]\ninterval_secs = 0\n").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_config_rejects_short_room_id_limit() {
        let mut config = Config::default();
        config.signal.max_room_id_length = 4;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.signal.room_code_length = 4;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[signal\nport = ").unwrap();

        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse(_))));
    }
}
