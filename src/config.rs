//! Service configuration loaded from the environment.
//!
//! # Environment Variables
//!
//! - `TASKS_FILE`: Path of the JSON persistence file (default: `tasks.json`)
//! - `HOST`: Server host address (default: `0.0.0.0`)
//! - `PORT`: Server port (default: `3000`)
//! - `LOG_FORMAT`: `pretty` (default) | `json`
//!
//! `RUST_LOG` is read separately by the tracing subscriber.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::infrastructure::DEFAULT_TASKS_FILE;

// =============================================================================
// Configuration Error
// =============================================================================

/// Errors raised while reading configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// `PORT` is not a valid port number.
    #[error("Invalid PORT value: {0}")]
    InvalidPort(String),

    /// `HOST` and `PORT` do not form a socket address.
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    /// `LOG_FORMAT` is not recognized.
    #[error("Invalid LOG_FORMAT value: {0}")]
    InvalidLogFormat(String),

    /// A variable holds non-UTF-8 data.
    #[error("Environment variable {0} is not valid UTF-8")]
    NotUnicode(&'static str),
}

// =============================================================================
// Log Format
// =============================================================================

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "pretty" | "text" | "plain" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(ConfigurationError::InvalidLogFormat(value.to_string())),
        }
    }
}

// =============================================================================
// Service Configuration
// =============================================================================

/// Runtime settings for the task tracker service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// JSON persistence file.
    pub tasks_file: PathBuf,
    /// Host address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            tasks_file: PathBuf::from(DEFAULT_TASKS_FILE),
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_format: LogFormat::default(),
        }
    }
}

impl ServiceConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the persistence file.
    #[must_use]
    pub fn with_tasks_file(self, tasks_file: impl Into<PathBuf>) -> Self {
        Self {
            tasks_file: tasks_file.into(),
            ..self
        }
    }

    /// Sets the host and port.
    #[must_use]
    pub fn with_address(self, host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..self
        }
    }

    /// Sets the log format.
    #[must_use]
    pub fn with_log_format(self, log_format: LogFormat) -> Self {
        Self { log_format, ..self }
    }

    /// Creates a configuration from environment variables.
    ///
    /// Unset or blank variables fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if `PORT` or `LOG_FORMAT` hold an
    /// invalid value, or if any variable is not valid UTF-8.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|name| env::var(name))
    }

    /// Creates a configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`ServiceConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&'static str) -> Result<String, env::VarError>,
    {
        let read = |name: &'static str| match lookup(name) {
            Ok(value) => {
                let value = value.trim().to_string();
                Ok((!value.is_empty()).then_some(value))
            }
            Err(env::VarError::NotPresent) => Ok(None),
            Err(env::VarError::NotUnicode(_)) => Err(ConfigurationError::NotUnicode(name)),
        };

        let defaults = Self::default();

        let tasks_file = read("TASKS_FILE")?.map_or(defaults.tasks_file, PathBuf::from);
        let host = read("HOST")?.unwrap_or(defaults.host);
        let port = match read("PORT")? {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigurationError::InvalidPort(value))?,
            None => defaults.port,
        };
        let log_format = match read("LOG_FORMAT")? {
            Some(value) => value.parse()?,
            None => defaults.log_format,
        };

        Ok(Self {
            tasks_file,
            host,
            port,
            log_format,
        })
    }

    /// Returns the socket address to bind.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidAddress` if `host:port` does not parse.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigurationError> {
        let address = format!("{}:{}", self.host, self.port);
        address
            .parse()
            .map_err(|_| ConfigurationError::InvalidAddress(address))
    }
}

// =============================================================================
// Tests
// =============================================================================
