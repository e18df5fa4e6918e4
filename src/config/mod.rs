//! # Configuration Management
//!
//! Broker configuration comes from a TOML document, from environment
//! variables prefixed `DATA_SOURCE_`, or from defaults. Every loader
//! validates the result before returning it.
//!
//! | Variable | Setting |
//! |----------|---------|
//! | `DATA_SOURCE_ENABLED` | `enabled` |
//! | `DATA_SOURCE_WRAPPING_KEY` | `wrapping_key.material` (base64, 32 bytes) |
//! | `DATA_SOURCE_WRAPPING_KEY_NAME` | `wrapping_key.name` |
//! | `DATA_SOURCE_WRAPPING_KEY_NAMESPACE` | `wrapping_key.namespace` |
//! | `DATA_SOURCE_AUDIT_SINK` | `audit.sink` (`file` or `tracing`) |
//! | `DATA_SOURCE_AUDIT_FILE_PATH` | `audit.file_path` |
//! | `DATA_SOURCE_CLIENT_REQUEST_TIMEOUT_SECONDS` | `client.request_timeout_seconds` |
//! | `DATA_SOURCE_CLIENT_CONNECT_TIMEOUT_SECONDS` | `client.connect_timeout_seconds` |
//! | `DATA_SOURCE_CLIENT_IDLE_TIMEOUT_SECONDS` | `client.idle_timeout_seconds` |
//! | `DATA_SOURCE_CLIENT_EVICTION_INTERVAL_SECONDS` | `client.eviction_interval_seconds` |
//! | `DATA_SOURCE_LOG_LEVEL` | `observability.log_level` |
//! | `DATA_SOURCE_JSON_LOGGING` | `observability.json_logging` |

pub mod settings;

pub use settings::{
    AuditSettings, AuditSinkKind, ClientSettings, DataSourceConfig, ObservabilityConfig,
    WrappingKeySettings, DEFAULT_AUDIT_FILE_PATH,
};

use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::domain::SecretString;
use crate::errors::{BrokerError, Result};

/// Prefix of every environment variable the broker reads
pub const ENV_PREFIX: &str = "DATA_SOURCE_";

impl DataSourceConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// `lookup` receives full variable names, prefix included.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{}{}", ENV_PREFIX, suffix));
        let mut config = Self::default();

        if let Some(value) = var("ENABLED") {
            config.enabled = parse_bool("ENABLED", &value)?;
        }

        if let Some(material) = var("WRAPPING_KEY") {
            config.wrapping_key.material = SecretString::new(material.trim());
        }
        if let Some(name) = var("WRAPPING_KEY_NAME") {
            config.wrapping_key.name = name;
        }
        if let Some(namespace) = var("WRAPPING_KEY_NAMESPACE") {
            config.wrapping_key.namespace = namespace;
        }

        if let Some(sink) = var("AUDIT_SINK") {
            config.audit.sink = AuditSinkKind::from_str(&sink)?;
        }
        if let Some(path) = var("AUDIT_FILE_PATH") {
            config.audit.file_path = PathBuf::from(path);
        }

        if let Some(value) = var("CLIENT_REQUEST_TIMEOUT_SECONDS") {
            config.client.request_timeout_seconds =
                parse_number("CLIENT_REQUEST_TIMEOUT_SECONDS", &value)?;
        }
        if let Some(value) = var("CLIENT_CONNECT_TIMEOUT_SECONDS") {
            config.client.connect_timeout_seconds =
                parse_number("CLIENT_CONNECT_TIMEOUT_SECONDS", &value)?;
        }
        if let Some(value) = var("CLIENT_IDLE_TIMEOUT_SECONDS") {
            config.client.idle_timeout_seconds =
                parse_number("CLIENT_IDLE_TIMEOUT_SECONDS", &value)?;
        }
        if let Some(value) = var("CLIENT_EVICTION_INTERVAL_SECONDS") {
            config.client.eviction_interval_seconds =
                parse_number("CLIENT_EVICTION_INTERVAL_SECONDS", &value)?;
        }

        if let Some(level) = var("LOG_LEVEL") {
            config.observability.log_level = level;
        }
        if let Some(value) = var("JSON_LOGGING") {
            config.observability.json_logging = parse_bool("JSON_LOGGING", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a TOML document. Missing sections take defaults.
    pub fn from_toml_str(document: &str) -> Result<Self> {
        let config: Self = toml::from_str(document).map_err(|e| {
            BrokerError::config_with_source("Failed to parse configuration TOML", Box::new(e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|e| BrokerError::Io {
            source: e,
            context: format!("Failed to read configuration file {}", path.display()),
        })?;
        Self::from_toml_str(&document)
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(BrokerError::config(format!("{}{} must be a boolean", ENV_PREFIX, name))),
    }
}

fn parse_number(name: &str, value: &str) -> Result<u64> {
    value.trim().parse::<u64>().map_err(|e| {
        BrokerError::config_with_source(
            format!("{}{} must be a non-negative integer", ENV_PREFIX, name),
            Box::new(e),
        )
    })
}
