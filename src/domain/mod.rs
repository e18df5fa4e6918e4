//! Domain layer
//!
//! Plain data types shared by the vault, the metadata store, the client pool
//! and the broker. Nothing here performs I/O or cryptography.
//!
//! - `id`: type-safe record identifiers
//! - `data_source`: tenant-visible data source records
//! - `credential`: plaintext credentials, key contexts and sealed records
//! - `secret`: redacting string wrapper

pub mod credential;
pub mod data_source;
pub mod id;
pub mod secret;

pub use credential::{
    AuthScheme, CipherRecord, Credential, CredentialRecord, KeyContext, WrappingKeyId,
};
pub use data_source::DataSourceRecord;
pub use id::{CredentialId, DataSourceId};
pub use secret::SecretString;
