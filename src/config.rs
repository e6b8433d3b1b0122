//! Bridge configuration
//!
//! Stored as TOML at `$PADLINK_CONFIG` or `<config dir>/padlink/config.toml`. Every
//! field has a default, so a partial file only overrides what it names. A missing file
//! is written with the defaults on first start.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const CONFIG_ENV: &str = "PADLINK_CONFIG";
const CONFIG_DIR: &str = "padlink";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No configuration directory available, set PADLINK_CONFIG")]
    NoConfigDir,

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub network: NetworkConfig,
    pub controller: ControllerConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
    pub transmit_hz: u32,
    pub send_timeout_ms: u64,
    /// At most one send error is logged per interval
    pub error_log_interval_ms: u64,
    /// Re-announce the link every N sent packets
    pub heartbeat_packets: u64,
    /// Send the neutral packet when the state cannot be encoded; otherwise skip the tick
    pub neutral_fallback: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "192.168.4.1".to_string(),
            port: 5500,
            transmit_hz: 100,
            send_timeout_ms: 1000,
            error_log_interval_ms: 1000,
            heartbeat_packets: 300,
            neutral_fallback: true,
        }
    }
}

impl NetworkConfig {
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub poll_hz: u32,
    pub deadzone: f32,
    pub error_pause_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_hz: 180,
            deadzone: 0.06,
            error_pause_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Per-loop wait on stop before the loop is detached
    pub stop_timeout_ms: u64,
    pub event_capacity: usize,
    pub autostart: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stop_timeout_ms: 2000,
            event_capacity: 256,
            autostart: true,
        }
    }
}

impl RuntimeConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl BridgeConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| -> Result<(), ConfigError> {
            Err(ConfigError::Invalid(message.to_string()))
        };

        if self.network.host.trim().is_empty() {
            return invalid("network.host must not be empty");
        }
        if self.network.port == 0 {
            return invalid("network.port must not be 0");
        }
        if self.network.transmit_hz == 0 {
            return invalid("network.transmit_hz must be at least 1");
        }
        if self.network.heartbeat_packets == 0 {
            return invalid("network.heartbeat_packets must be at least 1");
        }
        if self.controller.poll_hz == 0 {
            return invalid("controller.poll_hz must be at least 1");
        }
        if !(0.0..1.0).contains(&self.controller.deadzone) {
            return invalid("controller.deadzone must be in [0, 1)");
        }
        if self.runtime.event_capacity == 0 {
            return invalid("runtime.event_capacity must be at least 1");
        }
        Ok(())
    }

    /// `$PADLINK_CONFIG`, else the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub async fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path().ok_or(ConfigError::NoConfigDir)?;
        Self::load_or_create(&path).await
    }

    /// Reads `path`, writing the defaults there first if it does not exist
    pub async fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if !tokio::fs::try_exists(path).await.map_err(io_error)? {
            info!("Creating default configuration at {}", path.display());
            let config = Self::default();
            config.save(path).await?;
            return Ok(config);
        }

        let text = tokio::fs::read_to_string(path).await.map_err(io_error)?;
        let config = Self::from_toml_str(&text)?;
        debug!("Loaded configuration from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        tokio::fs::write(path, self.to_toml_string()?)
            .await
            .map_err(io_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("padlink-config-{}-{}", std::process::id(), name))
            .join(CONFIG_FILE)
    }

    #[test]
    fn defaults_match_the_field_deployment() {
        let config = BridgeConfig::default();
        assert_eq!(config.network.target(), "192.168.4.1:5500");
        assert_eq!(config.network.transmit_hz, 100);
        assert_eq!(config.network.error_log_interval_ms, 1000);
        assert_eq!(config.network.heartbeat_packets, 300);
        assert!(config.network.neutral_fallback);
        assert_eq!(config.controller.poll_hz, 180);
        assert_eq!(config.runtime.stop_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = BridgeConfig::from_toml_str(
            r#"
            [network]
            host = "10.0.0.7"
            neutral_fallback = false

            [controller]
            poll_hz = 250
            "#,
        )
        .expect("partial config should parse");

        assert_eq!(config.network.target(), "10.0.0.7:5500");
        assert!(!config.network.neutral_fallback);
        assert_eq!(config.controller.poll_hz, 250);
        assert_eq!(config.controller.deadzone, 0.06);
        assert_eq!(config.runtime, RuntimeConfig::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        for text in [
            "[network]\nport = 0",
            "[network]\ntransmit_hz = 0",
            "[network]\nhost = \"  \"",
            "[controller]\ndeadzone = 1.0",
            "[controller]\ndeadzone = -0.1",
        ] {
            assert!(
                matches!(BridgeConfig::from_toml_str(text), Err(ConfigError::Invalid(_))),
                "{text} should be rejected"
            );
        }
        assert!(matches!(
            BridgeConfig::from_toml_str("[network]\nport = \"udp\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn toml_round_trip() {
        let mut config = BridgeConfig::default();
        config.network.port = 6000;
        config.runtime.autostart = false;
        let text = config.to_toml_string().expect("config should serialize");
        assert_eq!(
            BridgeConfig::from_toml_str(&text).expect("config should parse"),
            config
        );
    }

    #[tokio::test]
    async fn missing_file_is_created_with_defaults() {
        let path = scratch_path("create");
        let _ = tokio::fs::remove_file(&path).await;

        let config = BridgeConfig::load_or_create(&path)
            .await
            .expect("default config should be written");
        assert_eq!(config, BridgeConfig::default());
        assert!(path.exists());

        let reloaded = BridgeConfig::load_or_create(&path)
            .await
            .expect("written config should load");
        assert_eq!(reloaded, config);

        if let Some(dir) = path.parent() {
            let _ = tokio::fs::remove_dir_all(dir).await;
        }
    }
}
