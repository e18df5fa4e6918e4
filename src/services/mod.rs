//! Business logic services
//!
//! - [`credential_vault`]: envelope encryption of credential material
//! - [`data_source_service`]: the broker handing out data source clients

pub mod credential_vault;
pub mod data_source_service;

pub use credential_vault::{CredentialVault, WrappingKey};
pub use data_source_service::DataSourceService;
