//! Configuration settings for the signed-request client.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use url::Url;

use crate::error::ClientError;

/// Main configuration structure for the client.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub api: ApiConfig,
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL every request path is resolved against.
    pub base_url: String,
    /// Devices collection, relative to the base URL.
    #[serde(default = "default_devices_path")]
    pub devices_path: String,
    /// Per-request timeout in seconds, unless the request overrides it.
    #[serde(default = "default_timeout")]
    pub default_timeout_seconds: u64,
    /// Auth-recovery retries per logical call.
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
    /// Lowest accepted status code (inclusive).
    #[serde(default = "default_acceptable_status_min")]
    pub acceptable_status_min: u16,
    /// Highest accepted status code (inclusive).
    #[serde(default = "default_acceptable_status_max")]
    pub acceptable_status_max: u16,
}

/// Shared secret configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    /// Identifier of the shared secret, sent in every key.
    pub secret_id: String,
    /// The secret itself. Prefer `secret_path` outside of development.
    pub secret: Option<String>,
    /// File holding the secret; must not be readable by group or others.
    pub secret_path: Option<PathBuf>,
}

/// Device registration configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvisioningConfig {
    /// Bound on each registration or descriptor update, in seconds.
    #[serde(default = "default_provisioning_timeout")]
    pub timeout_seconds: u64,
}

/// Persisted auth state configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// JSON state file. State is kept in memory when absent.
    pub path: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("pretty" or "json").
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_devices_path() -> String {
    "/devices".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_retry_budget() -> u32 {
    2
}

fn default_acceptable_status_min() -> u16 {
    200
}

fn default_acceptable_status_max() -> u16 {
    299
}

fn default_provisioning_timeout() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_provisioning_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl ApiConfig {
    /// Parsed base URL.
    pub fn base_url(&self) -> Result<Url, ClientError> {
        Url::parse(&self.base_url).map_err(|e| ClientError::Config {
            message: format!("Invalid base URL '{}': {}", self.base_url, e),
        })
    }
}

impl CredentialsConfig {
    /// Resolve the secret, reading `secret_path` when no inline secret is set.
    pub fn load_secret(&self) -> Result<String, ClientError> {
        if let Some(secret) = &self.secret {
            return Ok(secret.clone());
        }
        match &self.secret_path {
            Some(path) => load_secret_file(path),
            None => Err(ClientError::Config {
                message: "credentials need either 'secret' or 'secret_path'".to_string(),
            }),
        }
    }
}

/// Load a secret from a file.
///
/// Security: Verifies the file has restrictive permissions (0600 or 0400)
/// before loading to prevent secrets from being readable by other users.
pub fn load_secret_file(path: &Path) -> Result<String, ClientError> {
    // Check file permissions first
    let metadata = std::fs::metadata(path).map_err(|e| ClientError::Config {
        message: format!(
            "Failed to read secret metadata from {}: {}",
            path.display(),
            e
        ),
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode();
        // Group and world bits must all be zero
        if mode & 0o077 != 0 {
            return Err(ClientError::Config {
                message: format!(
                    "Secret file {} has insecure permissions {:04o}, expected 0600 or 0400",
                    path.display(),
                    mode & 0o777
                ),
            });
        }
    }
    #[cfg(not(unix))]
    let _ = metadata;

    let content = std::fs::read_to_string(path).map_err(|e| ClientError::Config {
        message: format!("Failed to read secret from {}: {}", path.display(), e),
    })?;

    let secret = content.trim();
    if secret.is_empty() {
        return Err(ClientError::Config {
            message: format!("Secret file {} is empty", path.display()),
        });
    }
    Ok(secret.to_string())
}

impl Settings {
    /// Load settings from a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ClientError::Config {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        let settings: Settings = toml::from_str(&content).map_err(|e| ClientError::Config {
            message: format!("Failed to parse config file '{}': {}", path.display(), e),
        })?;

        settings.validate()?;

        Ok(settings)
    }

    /// Parse and validate settings from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ClientError> {
        let settings: Settings = toml::from_str(content).map_err(|e| ClientError::Config {
            message: format!("Failed to parse config: {}", e),
        })?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), ClientError> {
        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ClientError::Config {
                message: format!(
                    "Invalid log level '{}'. Valid levels: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        // Validate log format
        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(ClientError::Config {
                message: format!(
                    "Invalid log format '{}'. Valid formats: {:?}",
                    self.logging.format, valid_formats
                ),
            });
        }

        let base_url = self.api.base_url()?;
        if base_url.host_str().is_none() {
            return Err(ClientError::Config {
                message: format!("Base URL '{}' has no host", self.api.base_url),
            });
        }

        if self.api.acceptable_status_min > self.api.acceptable_status_max {
            return Err(ClientError::Config {
                message: format!(
                    "Empty accepted status range {}..={}",
                    self.api.acceptable_status_min, self.api.acceptable_status_max
                ),
            });
        }

        if self.api.default_timeout_seconds == 0 || self.provisioning.timeout_seconds == 0 {
            return Err(ClientError::Config {
                message: "Timeouts must be at least one second".to_string(),
            });
        }

        if self.credentials.secret_id.is_empty() {
            return Err(ClientError::Config {
                message: "credentials.secret_id must not be empty".to_string(),
            });
        }

        if self.credentials.secret.is_none() && self.credentials.secret_path.is_none() {
            return Err(ClientError::Config {
                message: "credentials need either 'secret' or 'secret_path'".to_string(),
            });
        }

        Ok(())
    }
}
