//! # Structured Logging
//!
//! Subscriber setup and span helpers built on `tracing`.
//!
//! Audit records travel on their own `audit` target when the tracing audit
//! sink is selected, so they can be routed or filtered independently of
//! operational logs (`RUST_LOG=info,audit=info`).

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ObservabilityConfig;
use crate::errors::{BrokerError, Result};

/// Create a tracing span for one broker call.
///
/// ```rust,ignore
/// let span = broker_span!("get_data_source_client", "ds-1");
/// let span = broker_span!("get_data_source_client", "ds-1", requester = "10.0.0.7");
/// ```
#[macro_export]
macro_rules! broker_span {
    ($operation:expr, $data_source_id:expr) => {
        tracing::info_span!(
            "broker_operation",
            operation = %$operation,
            data_source_id = %$data_source_id,
            operation_id = %uuid::Uuid::new_v4(),
            requester = tracing::field::Empty
        )
    };
    ($operation:expr, $data_source_id:expr, requester = $requester:expr) => {
        tracing::info_span!(
            "broker_operation",
            operation = %$operation,
            data_source_id = %$data_source_id,
            operation_id = %uuid::Uuid::new_v4(),
            requester = %$requester
        )
    };
}

/// Build the env filter: `RUST_LOG` wins over the configured level.
pub fn build_filter(config: &ObservabilityConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.log_level).map_err(|e| {
        BrokerError::config_with_source(
            format!("Invalid log level '{}'", config.log_level),
            Box::new(e),
        )
    })
}

/// Install the global subscriber.
///
/// Returns `Ok(false)` if a subscriber was already installed (e.g. by a
/// host application or a test harness).
pub fn init_tracing(config: &ObservabilityConfig) -> Result<bool> {
    let filter = build_filter(config)?;

    let installed = if config.json_logging {
        fmt().json().with_env_filter(filter).with_current_span(true).try_init().is_ok()
    } else {
        fmt().with_env_filter(filter).with_target(true).try_init().is_ok()
    };

    if installed {
        tracing::info!(
            service_name = %config.service_name,
            log_level = %config.log_level,
            json_logging = config.json_logging,
            "Logging initialized"
        );
    }
    Ok(installed)
}

/// Log configuration at startup. Never logs key material.
pub fn log_config_info(config: &crate::config::DataSourceConfig) {
    tracing::info!(
        enabled = config.enabled,
        wrapping_key = %format!("{}/{}", config.wrapping_key.namespace, config.wrapping_key.name),
        audit_sink = ?config.audit.sink,
        audit_path = %config.audit.file_path.display(),
        idle_timeout_secs = config.client.idle_timeout_seconds,
        "Data source broker configuration"
    );
}
