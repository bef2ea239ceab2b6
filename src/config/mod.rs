//! Configuration system for OrbitKeys
//!
//! Loads configuration from a TOML file, then lets `ORBITKEYS_*` environment
//! variables override the root key, storage path and base URL.

mod types;

pub use types::*;

use crate::auth::{
    generate_api_key, KeyError, ThrottleSettings, DEFAULT_AUTH_TIMEOUT, DEFAULT_KEY_LENGTH,
};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;

/// Environment variable holding the root API key
pub const ENV_ROOT_API_KEY: &str = "ORBITKEYS_ROOT_API_KEY";
/// Environment variable holding the storage path
pub const ENV_DB_PATH: &str = "ORBITKEYS_DB_PATH";
/// Environment variable holding the API base URL
pub const ENV_BASE_URL: &str = "ORBITKEYS_BASE_URL";

/// Characters that cause an environment value to be ignored
const UNSAFE_ENV_CHARS: &[char] = &[';', '&', '|', '`', '$', '(', ')', '<', '>'];

const DEFAULT_BASE_URL: &str = "/api";
const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_STORAGE_PATH: &str = "orbitkeys.json";

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to generate root API key: {0}")]
    RootKey(#[from] KeyError),
}

/// Main OrbitKeys configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared secret for the administrative endpoints (empty when unset)
    pub root_api_key: SecretString,
    /// Prefix for all HTTP routes, e.g. `/api`
    pub base_url: String,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file, applying environment overrides
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !fs::try_exists(path).await? {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).await?;
        let mut raw: RawConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        raw.apply_env(|key| std::env::var(key).ok());

        Self::from_raw(raw)
    }

    /// Like [`Config::load`], but a missing file yields the defaults
    /// (still subject to environment overrides)
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match Self::load(path).await {
            Err(ConfigError::NotFound(_)) => Self::from_env(),
            other => other,
        }
    }

    /// Build a configuration from defaults and the environment only
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut raw = RawConfig::default();
        raw.apply_env(|key| std::env::var(key).ok());
        Self::from_raw(raw)
    }

    /// Load configuration from a string (no environment overrides)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Self::from_raw(raw)
    }

    /// Convert from raw TOML config to validated config
    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let server = raw.server.unwrap_or_default().into();
        let storage = raw.storage.unwrap_or_default().try_into()?;
        let auth = raw.auth.unwrap_or_default().try_into()?;
        let logging = raw.logging.unwrap_or_default().try_into()?;

        Ok(Self {
            root_api_key: SecretString::from(raw.root_api_key.unwrap_or_default()),
            base_url: normalize_base_url(raw.base_url.as_deref()),
            server,
            storage,
            auth,
            logging,
        })
    }

    /// Whether a root API key is set
    pub fn has_root_key(&self) -> bool {
        !self.root_api_key.expose_secret().is_empty()
    }

    /// Generate a root API key if none is configured
    ///
    /// Returns true when a new key was generated.
    pub fn ensure_root_key(&mut self) -> Result<bool, ConfigError> {
        if self.has_root_key() {
            return Ok(false);
        }

        self.root_api_key = SecretString::from(generate_api_key(DEFAULT_KEY_LENGTH)?);
        Ok(true)
    }

    /// Render the configuration as TOML (includes the root key)
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(&RawConfig::from(self))
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Write the configuration to `path` atomically
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = self.to_toml()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, content).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(())
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            root_api_key: SecretString::from(String::new()),
            base_url: DEFAULT_BASE_URL.to_string(),
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            auth: AuthConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("orbitkeys")
            .join("config.toml")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

/// Leading slash, no trailing slash; blank means the default `/api`
fn normalize_base_url(raw: Option<&str>) -> String {
    let trimmed = raw.map(str::trim).unwrap_or_default().trim_end_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_BASE_URL.to_string();
    }

    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackendType,
    /// Path for file storage
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendType::File,
            path: PathBuf::from(DEFAULT_STORAGE_PATH),
        }
    }
}

/// Storage backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackendType {
    /// JSON file storage
    File,
    /// Non-persistent in-memory storage
    Memory,
}

impl StorageBackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Memory => "memory",
        }
    }
}

/// Authentication gate settings
#[derive(Debug, Clone, Copy)]
pub struct AuthConfig {
    /// Time budget for one authentication
    pub request_timeout: Duration,
    pub throttle: ThrottleSettings,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_AUTH_TIMEOUT,
            throttle: ThrottleSettings::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Format: "json" or "pretty"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format
    Pretty,
    /// JSON format
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}
