//! Error types for metadata store operations.

use thiserror::Error;

use crate::errors::VaultError;

/// Result type for metadata store operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur while reading or writing typed records.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Referenced record does not exist.
    #[error("Resource not found: {kind} with ID '{id}'")]
    NotFound { kind: String, id: String },

    /// A record with the same kind and id already exists.
    #[error("Resource conflict: {kind} with ID '{id}' already exists")]
    Conflict { kind: String, id: String },

    /// Stored attributes do not match the expected record shape.
    #[error("Invalid {kind} record '{id}': {reason}")]
    InvalidRecord { kind: String, id: String, reason: String },

    /// Sealing a credential before write failed; nothing was written.
    #[error("Credential protection failed for record '{id}': {source}")]
    CredentialProtection {
        id: String,
        #[source]
        source: VaultError,
    },

    /// Backend-specific error.
    #[error("Metadata store error: {message}")]
    Backend { message: String },
}

impl StorageError {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound { kind: kind.into(), id: id.into() }
    }

    pub fn conflict(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Conflict { kind: kind.into(), id: id.into() }
    }

    pub fn invalid_record(
        kind: impl Into<String>,
        id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidRecord { kind: kind.into(), id: id.into(), reason: reason.into() }
    }

    pub fn credential_protection(id: impl Into<String>, source: VaultError) -> Self {
        Self::CredentialProtection { id: id.into(), source }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend { message: message.into() }
    }
}
