//! # Data Source Broker
//!
//! Brokers access to remote data clusters on behalf of a multi-tenant
//! application. Tenants register data sources (an endpoint plus a reference
//! to sealed authentication material); callers ask for a ready-to-use client
//! by data source id and never see plaintext credentials.
//!
//! ## Architecture
//!
//! ```text
//! route handler → DataSourceService → metadata store (read)
//!                        ↓                   ↑ sealed on write by CredentialInterceptor
//!                 CredentialVault (open)
//!                        ↓
//!                   ClientPool → ClientFactory → ClusterClient
//!                        ↓
//!                  ScopedAuditor → AuditSink
//! ```
//!
//! ## Core Components
//!
//! - **Credential Vault**: AES-256-GCM envelope encryption with a process-wide
//!   wrapping key ([`services::credential_vault`])
//! - **Credential Interceptor**: seals credential records before they are
//!   persisted ([`storage::interceptor`])
//! - **Client Pool**: single-flight cache of live clients keyed by data source
//!   and connection fingerprint ([`pool`])
//! - **Broker**: read, open, connect, audit ([`services::data_source_service`])
//! - **Auditor**: per-request access trail ([`audit`])
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use datasource_broker::{
//!     audit::{sink_from_settings, ScopedAuditor},
//!     config::DataSourceConfig,
//!     services::{CredentialVault, DataSourceService},
//!     storage::{CredentialInterceptor, InMemoryMetadataStore},
//!     Result,
//! };
//!
//! # async fn run(headers: http::HeaderMap) -> Result<()> {
//! let config = DataSourceConfig::from_env()?;
//! let vault = Arc::new(CredentialVault::new(config.wrapping_key.load()?));
//! let store = CredentialInterceptor::new(InMemoryMetadataStore::new(), vault.clone());
//! let service = DataSourceService::setup(&config).await;
//!
//! let auditor = ScopedAuditor::new(&headers, sink_from_settings(&config.audit));
//! let client = service
//!     .get_data_source_client(&"ds-1".into(), &store, &vault, &auditor)
//!     .await
//!     .map_err(|e| e.source)?;
//! # let _ = client;
//! service.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod audit;
pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod observability;
pub mod pool;
pub mod services;
pub mod storage;

// Re-export commonly used types and traits
pub use config::DataSourceConfig;
pub use errors::{BrokerError, DataSourceError, Result};
pub use observability::init_tracing;
pub use services::{CredentialVault, DataSourceService, WrappingKey};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "datasource-broker");
    }
}
