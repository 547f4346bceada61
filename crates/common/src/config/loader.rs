//! Configuration loader
//!
//! Loads [`AppConfig`] from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `AUDILINK_USERNAME`: Account email (required)
//! - `AUDILINK_PASSWORD`: Account password (required)
//! - `AUDILINK_TOKEN_FILE`: Session file location (optional)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.json` or `./config.toml` (current working directory)
//! 2. `./audilink.json` or `./audilink.toml` (current working directory)
//! 3. `~/.config/audilink/config.{json,toml}`

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::AppConfig;
use crate::error::{ErrorClassification, ErrorSeverity};

/// Environment variable holding the account email.
pub const ENV_USERNAME: &str = "AUDILINK_USERNAME";
/// Environment variable holding the account password.
pub const ENV_PASSWORD: &str = "AUDILINK_PASSWORD";
/// Environment variable overriding the session file location.
pub const ENV_TOKEN_FILE: &str = "AUDILINK_TOKEN_FILE";

/// Configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// An explicitly requested file does not exist
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// No file exists in any probed location
    #[error("no config file found in any of the standard locations")]
    NoConfigFile,

    /// The file could not be read
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON/TOML for [`AppConfig`]
    #[error("invalid {format} config: {message}")]
    InvalidFormat {
        /// `json` or `toml`
        format: &'static str,
        /// Parser message
        message: String,
    },

    /// The file extension is neither `.json` nor `.toml`
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),
}

impl ErrorClassification for ConfigError {
    fn is_retryable(&self) -> bool {
        false
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::MissingVar(_) | Self::NoConfigFile => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<std::time::Duration> {
        None
    }
}

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns the file error when neither source yields a configuration.
pub fn load() -> Result<AppConfig, ConfigError> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns [`ConfigError::MissingVar`] if username or password is unset.
pub fn load_from_env() -> Result<AppConfig, ConfigError> {
    let username = env_var(ENV_USERNAME)?;
    let password = env_var(ENV_PASSWORD)?;
    let token_file = std::env::var_os(ENV_TOKEN_FILE).map(PathBuf::from);

    Ok(AppConfig { username, password, token_file, auth: super::AuthConfig::default() })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. Format is detected by
/// file extension.
///
/// # Errors
/// Returns [`ConfigError`] if the file is missing, unreadable or malformed.
pub fn load_from_file(path: Option<PathBuf>) -> Result<AppConfig, ConfigError> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::NotFound(p));
            }
            p
        }
        None => probe_config_paths().ok_or(ConfigError::NoConfigFile)?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|source| ConfigError::Io { path: config_path.clone(), source })?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<AppConfig, ConfigError> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| ConfigError::InvalidFormat { format: "toml", message: e.to_string() }),
        "json" => serde_json::from_str(contents)
            .map_err(|e| ConfigError::InvalidFormat { format: "json", message: e.to_string() }),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

/// Probe the standard locations for a config file
///
/// # Returns
/// The first config file found, or `None` if no file exists.
#[must_use]
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend([
            cwd.join("config.json"),
            cwd.join("config.toml"),
            cwd.join("audilink.json"),
            cwd.join("audilink.toml"),
        ]);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let dir = config_dir.join("audilink");
        candidates.extend([dir.join("config.json"), dir.join("config.toml")]);
    }

    candidates.into_iter().find(|path| path.exists())
}

fn env_var(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::MissingVar(key))
}
