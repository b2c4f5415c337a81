//! Configuration management

use anyhow::{Context, Result};
use screenstream_server::{Fps, ServerConfig, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Path to configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// IP address the stream is served on
    pub ip_address: String,

    /// TCP port the stream is served on
    pub port: u16,

    /// Stream frame rate (120, 60, 30 or 15)
    pub fps: Fps,

    /// Give up on a client whose frame write takes longer than this (milliseconds)
    pub send_timeout_ms: u64,

    /// Maximum concurrent clients (unset = unlimited)
    pub max_clients: Option<usize>,

    /// Directory of JPEG files streamed in a loop
    pub image_dir: Option<PathBuf>,

    /// How often the connected client count is logged (seconds)
    pub status_interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            config_path: Self::default_config_path(),
            ip_address: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            fps: Fps::default(),
            send_timeout_ms: 5000,
            max_clients: None,
            image_dir: None,
            status_interval_secs: 1,
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default location, or create it
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_config_path())
    }

    /// Load configuration from `config_path`, creating a default file if missing
    pub fn load_from(config_path: impl AsRef<Path>) -> Result<Self> {
        let config_path = config_path.as_ref().to_path_buf();

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let mut config: DaemonConfig = toml::from_str(&contents)
                .context("Failed to parse config file")?;

            config.config_path = config_path;
            Ok(config)
        } else {
            let config = Self {
                config_path,
                ..Self::default()
            };
            config.save()
                .context("Failed to save default config")?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(&self.config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Server settings for one run
    pub fn server_config(&self) -> Result<ServerConfig> {
        let config = ServerConfig::new(&self.ip_address, self.port)
            .with_context(|| format!("Invalid IP address in configuration: {}", self.ip_address))?
            .with_fps(self.fps)
            .with_send_timeout(Duration::from_millis(self.send_timeout_ms))
            .with_max_clients(self.max_clients);

        config.validate().context("Invalid server configuration")?;
        Ok(config)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs.max(1))
    }

    /// Get default config path
    fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("screenstream")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_creates_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = DaemonConfig::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.config_path, path);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.fps, Fps::Thirty);

        let reloaded = DaemonConfig::load_from(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = 8081\nfps = 60\nimage_dir = \"/srv/frames\"\n").unwrap();

        let config = DaemonConfig::load_from(&path).unwrap();
        assert_eq!(config.port, 8081);
        assert_eq!(config.fps, Fps::Sixty);
        assert_eq!(config.ip_address, "127.0.0.1");
        assert_eq!(config.image_dir, Some(PathBuf::from("/srv/frames")));
        assert_eq!(config.max_clients, None);
    }

    #[test]
    fn test_invalid_fps_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "fps = 24\n").unwrap();

        assert!(DaemonConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_server_config_conversion() {
        let config = DaemonConfig {
            ip_address: "0.0.0.0".to_string(),
            port: 9000,
            fps: Fps::Fifteen,
            send_timeout_ms: 250,
            max_clients: Some(4),
            ..DaemonConfig::default()
        };

        let server = config.server_config().unwrap();
        assert_eq!(server.bind_addr().to_string(), "0.0.0.0:9000");
        assert_eq!(server.frame_delay(), Duration::from_millis(66));
        assert_eq!(server.send_timeout, Duration::from_millis(250));
        assert_eq!(server.max_clients, Some(4));
    }

    #[test]
    fn test_server_config_rejects_bad_values() {
        let bad_ip = DaemonConfig {
            ip_address: "192.168.1".to_string(),
            ..DaemonConfig::default()
        };
        assert!(bad_ip.server_config().is_err());

        let zero_timeout = DaemonConfig {
            send_timeout_ms: 0,
            ..DaemonConfig::default()
        };
        assert!(zero_timeout.server_config().is_err());
    }
}
