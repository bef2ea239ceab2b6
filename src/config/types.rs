//! Raw configuration types for TOML parsing

use super::*;
use serde::{Deserialize, Serialize};

/// Raw configuration as parsed from TOML
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RawConfig {
    pub root_api_key: Option<String>,
    pub base_url: Option<String>,
    pub server: Option<RawServerConfig>,
    pub storage: Option<RawStorageConfig>,
    pub auth: Option<RawAuthConfig>,
    pub logging: Option<RawLoggingConfig>,
}

impl RawConfig {
    /// Overlay values from the `ORBITKEYS_*` variables found by `lookup`
    pub(super) fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = sanitize_env(ENV_ROOT_API_KEY, &lookup) {
            self.root_api_key = Some(key);
        }
        if let Some(path) = sanitize_env(ENV_DB_PATH, &lookup) {
            self.storage.get_or_insert_with(Default::default).path = Some(path);
        }
        if let Some(base_url) = sanitize_env(ENV_BASE_URL, &lookup) {
            self.base_url = Some(base_url);
        }
    }
}

impl From<&Config> for RawConfig {
    fn from(config: &Config) -> Self {
        let root_api_key = config.root_api_key.expose_secret();
        Self {
            root_api_key: (!root_api_key.is_empty()).then(|| root_api_key.to_string()),
            base_url: Some(config.base_url.clone()),
            server: Some(RawServerConfig {
                bind: Some(config.server.bind.clone()),
            }),
            storage: Some(RawStorageConfig {
                backend: Some(config.storage.backend.as_str().to_string()),
                path: Some(config.storage.path.display().to_string()),
            }),
            auth: Some(RawAuthConfig {
                request_timeout_ms: Some(config.auth.request_timeout.as_millis() as u64),
                max_failed_attempts: Some(config.auth.throttle.max_attempts),
                failure_window_secs: Some(config.auth.throttle.window.as_secs()),
                lockout_secs: Some(config.auth.throttle.lockout.as_secs()),
            }),
            logging: Some(RawLoggingConfig {
                level: Some(config.logging.level.clone()),
                format: Some(config.logging.format.as_str().to_string()),
            }),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RawServerConfig {
    pub bind: Option<String>,
}

impl From<RawServerConfig> for ServerConfig {
    fn from(raw: RawServerConfig) -> Self {
        Self {
            bind: raw.bind.unwrap_or_else(|| DEFAULT_BIND.to_string()),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RawStorageConfig {
    pub backend: Option<String>,
    pub path: Option<String>,
}

impl TryFrom<RawStorageConfig> for StorageConfig {
    type Error = ConfigError;

    fn try_from(raw: RawStorageConfig) -> Result<Self, Self::Error> {
        let backend = match raw.backend.as_deref() {
            Some("file") | None => StorageBackendType::File,
            Some("memory") => StorageBackendType::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid(format!(
                    "Unknown storage backend: {}",
                    other
                )))
            }
        };

        let path = match raw.path.as_deref().map(str::trim) {
            None | Some("") => PathBuf::from(DEFAULT_STORAGE_PATH),
            Some(p) if p.contains("..") => {
                return Err(ConfigError::Invalid(format!("Invalid storage path: {}", p)))
            }
            Some(p) => {
                // Expand ~ to home directory
                if let Some(rest) = p.strip_prefix("~/") {
                    dirs::home_dir()
                        .unwrap_or_else(|| PathBuf::from("."))
                        .join(rest)
                } else {
                    PathBuf::from(p)
                }
            }
        };

        Ok(Self { backend, path })
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RawAuthConfig {
    pub request_timeout_ms: Option<u64>,
    pub max_failed_attempts: Option<u32>,
    pub failure_window_secs: Option<u64>,
    pub lockout_secs: Option<u64>,
}

impl TryFrom<RawAuthConfig> for AuthConfig {
    type Error = ConfigError;

    fn try_from(raw: RawAuthConfig) -> Result<Self, Self::Error> {
        let defaults = ThrottleSettings::default();

        let request_timeout = raw
            .request_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_AUTH_TIMEOUT);
        if request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "auth.request_timeout_ms must be greater than zero".to_string(),
            ));
        }

        let max_attempts = raw.max_failed_attempts.unwrap_or(defaults.max_attempts);
        if max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "auth.max_failed_attempts must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            request_timeout,
            throttle: ThrottleSettings {
                max_attempts,
                window: raw
                    .failure_window_secs
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.window),
                lockout: raw
                    .lockout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.lockout),
            },
        })
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RawLoggingConfig {
    pub level: Option<String>,
    pub format: Option<String>,
}

impl TryFrom<RawLoggingConfig> for LoggingConfig {
    type Error = ConfigError;

    fn try_from(raw: RawLoggingConfig) -> Result<Self, Self::Error> {
        let format = match raw.format.as_deref() {
            Some("pretty") | None => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid(format!("Unknown log format: {}", other)))
            }
        };

        Ok(Self {
            level: raw.level.unwrap_or_else(|| "info".to_string()),
            format,
        })
    }
}

/// Read an environment value, trimmed
///
/// Blank values and values containing shell metacharacters are ignored.
fn sanitize_env<F>(key: &str, lookup: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key)?.trim().to_string();
    if value.is_empty() {
        return None;
    }

    if value.contains(UNSAFE_ENV_CHARS) {
        tracing::warn!(
            variable = key,
            "Environment variable contains unsafe characters and was ignored"
        );
        return None;
    }

    Some(value)
}
