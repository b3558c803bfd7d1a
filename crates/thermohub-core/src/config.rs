//! Application configuration management.
//!
//! Handles loading, saving, and validating thermohub configuration:
//! - HTTP listener address
//! - Registry capacity and discovery mode at startup
//! - Location of the persisted device settings
//! - Local radio scanner

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_PATH_ENV: &str = "THERMOHUB_CONFIG";

/// Default cap on tracked devices.
pub const DEFAULT_MAX_DEVICES: usize = 50;

/// Errors raised while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No file at the given path.
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The file exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    ReadError {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    WriteError {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`HubConfig`].
    #[error("invalid configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// The configuration could not be serialized.
    #[error("failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A value is out of range.
    #[error("invalid value for '{field}': {message}")]
    ValidationError {
        /// Dotted field path.
        field: String,
        /// What is wrong with it.
        message: String,
    },
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// HTTP listener.
    pub server: ServerConfig,
    /// Device registry.
    pub registry: RegistryConfig,
    /// Persisted device settings.
    pub storage: StorageConfig,
    /// Local radio scanner.
    pub scanner: ScannerConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind: IpAddr,
    /// Port to bind.
    pub port: u16,
    /// Production logging (JSON files plus compact stdout).
    pub production: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            production: false,
        }
    }
}

/// Device registry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Maximum number of tracked devices.
    pub max_devices: usize,
    /// Whether discovery mode is on when the hub starts.
    pub discovery_on_start: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_devices: DEFAULT_MAX_DEVICES,
            discovery_on_start: false,
        }
    }
}

/// Settings persistence configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Settings file. Defaults to `settings.json` in the data directory.
    pub settings_path: Option<PathBuf>,
}

impl StorageConfig {
    /// The configured settings path, or the platform default.
    #[must_use]
    pub fn resolved_settings_path(&self) -> PathBuf {
        self.settings_path
            .clone()
            .unwrap_or_else(|| default_data_dir().join("settings.json"))
    }
}

/// Local scanner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Whether to run the local BLE scanner.
    pub enabled: bool,
    /// Adapter name (e.g. `hci0`). Uses the default adapter when unset.
    pub adapter: Option<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            adapter: None,
        }
    }
}

impl HubConfig {
    /// Loads configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable, malformed or
    /// fails validation.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from `path`, falling back to defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or is invalid.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => {
                tracing::info!(path = %path.display(), "No configuration file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Loads from [`CONFIG_PATH_ENV`] if set, else the platform config path.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or is invalid.
    pub fn from_env_or_default() -> ConfigResult<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map_or_else(default_config_path, PathBuf::from);
        Self::load_or_default(&path)
    }

    /// Writes configuration to `path` as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::WriteError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for the first bad value.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError {
                field: "server.port".into(),
                message: "must be non-zero".into(),
            });
        }
        if self.registry.max_devices == 0 {
            return Err(ConfigError::ValidationError {
                field: "registry.max_devices".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Platform configuration file path.
///
/// On Linux: `/etc/thermohub/config.toml`. Elsewhere: the user config dir.
#[must_use]
pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/etc/thermohub/config.toml")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "thermohub").map_or_else(
            || PathBuf::from("config.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }
}

/// Platform data directory.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "thermohub")
        .map_or_else(|| PathBuf::from("./data"), |dirs| dirs.data_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = HubConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.registry.max_devices, DEFAULT_MAX_DEVICES);
        assert!(!config.registry.discovery_on_start);
        assert!(config.scanner.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: HubConfig = toml::from_str(
            r#"
            [registry]
            discovery_on_start = true
            "#,
        )
        .unwrap();
        assert!(config.registry.discovery_on_start);
        assert_eq!(config.registry.max_devices, DEFAULT_MAX_DEVICES);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = HubConfig::default();
        config.server.port = 9000;
        config.storage.settings_path = Some(dir.path().join("settings.json"));
        config.save(&path).unwrap();

        let loaded = HubConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            HubConfig::load(&path),
            Err(ConfigError::NotFound(_))
        ));
        assert_eq!(
            HubConfig::load_or_default(&path).unwrap(),
            HubConfig::default()
        );
    }

    #[test]
    fn test_validation_rejects_zero_capacity() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[registry]\nmax_devices = 0\n").unwrap();
        let err = HubConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { ref field, .. } if field == "registry.max_devices"));
    }

    #[test]
    fn test_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        assert!(matches!(
            HubConfig::load(&path),
            Err(ConfigError::ParseError(_))
        ));
    }
}
