//! Integration tests for configuration management
//!
//! These tests validate that configuration is read from the environment and
//! from TOML files, and that a loaded configuration yields a working vault
//! and broker service.

use std::env;
use std::sync::Mutex;

use datasource_broker::config::{AuditSinkKind, DataSourceConfig};
use datasource_broker::observability::log_config_info;
use datasource_broker::{DataSourceService, Result, WrappingKey};
use tracing_test::traced_test;

// Use a mutex to serialize tests that modify environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const VARS: [&str; 5] = [
    "DATA_SOURCE_ENABLED",
    "DATA_SOURCE_WRAPPING_KEY",
    "DATA_SOURCE_WRAPPING_KEY_NAME",
    "DATA_SOURCE_AUDIT_SINK",
    "DATA_SOURCE_CLIENT_IDLE_TIMEOUT_SECONDS",
];

/// Run `body` with the given variables set, restoring the environment after.
fn with_env<T>(vars: &[(&str, &str)], body: impl FnOnce() -> T) -> T {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    let saved: Vec<(&str, Option<String>)> =
        VARS.iter().map(|name| (*name, env::var(name).ok())).collect();
    for name in VARS {
        env::remove_var(name);
    }
    for (name, value) in vars {
        env::set_var(name, value);
    }

    let result = body();

    for (name, value) in saved {
        match value {
            Some(value) => env::set_var(name, value),
            None => env::remove_var(name),
        }
    }
    result
}

fn encoded_key() -> String {
    WrappingKey::generate("env-key", "default").unwrap().to_base64().as_str().to_string()
}

#[test]
fn test_config_environment_integration() -> Result<()> {
    let material = encoded_key();

    let config = with_env(
        &[
            ("DATA_SOURCE_WRAPPING_KEY", material.as_str()),
            ("DATA_SOURCE_WRAPPING_KEY_NAME", "env-key"),
            ("DATA_SOURCE_AUDIT_SINK", "tracing"),
            ("DATA_SOURCE_CLIENT_IDLE_TIMEOUT_SECONDS", "120"),
        ],
        DataSourceConfig::from_env,
    )?;

    assert!(config.enabled);
    assert_eq!(config.wrapping_key.name, "env-key");
    assert_eq!(config.audit.sink, AuditSinkKind::Tracing);
    assert_eq!(config.client.idle_timeout_seconds, 120);

    let key = config.wrapping_key.load()?;
    assert_eq!(key.id().name, "env-key");

    Ok(())
}

#[test]
fn test_config_rejects_invalid_environment() {
    let result = with_env(
        &[("DATA_SOURCE_WRAPPING_KEY", "a2V5"), ("DATA_SOURCE_CLIENT_IDLE_TIMEOUT_SECONDS", "soon")],
        DataSourceConfig::from_env,
    );
    assert!(result.is_err());

    // Enabled without key material
    let result = with_env(&[], DataSourceConfig::from_env);
    assert!(result.is_err());

    // Disabled needs no key
    let config = with_env(&[("DATA_SOURCE_ENABLED", "false")], DataSourceConfig::from_env).unwrap();
    assert!(!config.enabled);
}

#[test]
fn test_config_from_toml_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("broker.toml");
    std::fs::write(
        &path,
        format!(
            r#"
            [wrapping_key]
            name = "file-key"
            material = "{}"

            [audit]
            sink = "file"
            file_path = "{}"

            [client]
            request_timeout_seconds = 15
            eviction_interval_seconds = 0
            "#,
            encoded_key(),
            dir.path().join("audit.log").display()
        ),
    )?;

    let config = DataSourceConfig::from_toml_file(&path)?;

    assert_eq!(config.wrapping_key.name, "file-key");
    assert_eq!(config.client.request_timeout_seconds, 15);
    assert_eq!(config.client.eviction_interval(), None);
    assert!(config.wrapping_key.load().is_ok());

    Ok(())
}

#[test]
fn test_config_from_missing_toml_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let result = DataSourceConfig::from_toml_file(dir.path().join("absent.toml"));
    assert!(result.is_err());
}

#[tokio::test]
#[traced_test]
async fn test_service_setup_from_config() {
    let config = DataSourceConfig {
        enabled: false,
        ..DataSourceConfig::default()
    };
    log_config_info(&config);

    let service = DataSourceService::setup(&config).await;
    assert!(!service.is_enabled());
    service.stop().await;
    service.stop().await;

    assert!(logs_contain("Data source broker configuration"));
    assert!(logs_contain("Data source service set up"));
}
