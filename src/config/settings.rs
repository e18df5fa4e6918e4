//! # Configuration Settings
//!
//! Defines the configuration structure for the data source broker.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

use crate::domain::SecretString;
use crate::errors::{BrokerError, Result, VaultError};
use crate::services::credential_vault::WrappingKey;

/// Default location of the data source audit log
pub const DEFAULT_AUDIT_FILE_PATH: &str = "./data/audit/data_source_audit.log";

/// Data source broker configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DataSourceConfig {
    /// Whether data source access is enabled at all
    pub enabled: bool,

    /// Wrapping key used to seal credentials
    #[validate(nested)]
    pub wrapping_key: WrappingKeySettings,

    /// Audit trail destination
    #[validate(nested)]
    pub audit: AuditSettings,

    /// Cluster client construction and pooling
    #[validate(nested)]
    pub client: ClientSettings,

    /// Logging
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            wrapping_key: WrappingKeySettings::default(),
            audit: AuditSettings::default(),
            client: ClientSettings::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl DataSourceConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(BrokerError::from)?;
        self.validate_custom()
    }

    /// Checks the validator derive cannot express
    fn validate_custom(&self) -> Result<()> {
        if self.enabled && self.wrapping_key.material.is_empty() {
            return Err(BrokerError::config(
                "Wrapping key material is required when data sources are enabled",
            ));
        }

        if self.audit.sink == AuditSinkKind::File && self.audit.file_path.as_os_str().is_empty() {
            return Err(BrokerError::config("Audit file path cannot be empty for the file sink"));
        }

        Ok(())
    }
}

/// Wrapping key identity and material
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct WrappingKeySettings {
    /// Key name recorded on every sealed credential
    #[validate(length(min = 1, max = 128, message = "Wrapping key name must be 1-128 characters"))]
    pub name: String,

    /// Key namespace recorded on every sealed credential
    #[validate(length(
        min = 1,
        max = 128,
        message = "Wrapping key namespace must be 1-128 characters"
    ))]
    pub namespace: String,

    /// Base64 encoded 32 byte key. Redacted when serialized.
    pub material: SecretString,
}

impl Default for WrappingKeySettings {
    fn default() -> Self {
        Self {
            name: "data-source-wrapping-key".to_string(),
            namespace: "default".to_string(),
            material: SecretString::default(),
        }
    }
}

impl WrappingKeySettings {
    /// Decode and check the configured key material.
    pub fn load(&self) -> std::result::Result<WrappingKey, VaultError> {
        if self.material.is_empty() {
            return Err(VaultError::invalid_key("no wrapping key material configured"));
        }
        WrappingKey::from_base64(&self.name, &self.namespace, self.material.expose_secret())
    }
}

/// Where audit records go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuditSinkKind {
    /// Append-only JSON lines file
    #[default]
    File,
    /// `tracing` events on the `audit` target
    Tracing,
}

impl std::str::FromStr for AuditSinkKind {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "tracing" | "log" => Ok(Self::Tracing),
            other => Err(BrokerError::config(format!("Unknown audit sink '{}'", other))),
        }
    }
}

/// Audit trail configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AuditSettings {
    pub sink: AuditSinkKind,

    /// Path of the audit log for the file sink
    pub file_path: PathBuf,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self { sink: AuditSinkKind::File, file_path: PathBuf::from(DEFAULT_AUDIT_FILE_PATH) }
    }
}

/// Cluster client settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ClientSettings {
    /// Per-request timeout in seconds
    #[validate(range(
        min = 1,
        max = 600,
        message = "Request timeout must be between 1 and 600 seconds"
    ))]
    pub request_timeout_seconds: u64,

    /// TCP connect timeout in seconds
    #[validate(range(
        min = 1,
        max = 120,
        message = "Connect timeout must be between 1 and 120 seconds"
    ))]
    pub connect_timeout_seconds: u64,

    /// Pooled clients unused for this long are closed
    #[validate(range(min = 1, message = "Idle timeout must be at least 1 second"))]
    pub idle_timeout_seconds: u64,

    /// How often the idle sweep runs (0 = never)
    pub eviction_interval_seconds: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 30,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600, // 10 minutes
            eviction_interval_seconds: 60,
        }
    }
}

impl ClientSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    /// Interval of the idle sweep (None if disabled)
    pub fn eviction_interval(&self) -> Option<Duration> {
        if self.eviction_interval_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.eviction_interval_seconds))
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Service name attached to log output
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "datasource-broker".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}
