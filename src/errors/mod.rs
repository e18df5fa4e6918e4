//! # Error Handling
//!
//! Error types for the data source broker using `thiserror`.
//!
//! Each component owns a focused error enum ([`VaultError`],
//! [`StorageError`], [`PoolError`], [`AuditError`]). They converge into
//! [`BrokerError`], and the broker surfaces every failure of a client request
//! as a single [`DataSourceError`] carrying the data source id.
//!
//! No variant ever carries plaintext credentials, ciphertext bytes or key
//! material.

pub mod vault;

pub use vault::VaultError;

pub use crate::audit::AuditError;
pub use crate::pool::PoolError;
pub use crate::storage::StorageError;

/// Custom result type for broker operations
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Main error type for the data source broker
#[derive(thiserror::Error, Debug)]
pub enum BrokerError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Credential encryption or decryption failed
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// Metadata store errors, including missing records
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Client pool errors
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Audit sink errors
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BrokerError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Whether the error means a referenced record does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, BrokerError::Storage(StorageError::NotFound { .. }))
    }

    /// Check if this error should be retried.
    ///
    /// Cryptographic failures never are: retrying with the same key yields
    /// the same result.
    pub fn is_retryable(&self) -> bool {
        match self {
            BrokerError::Pool(PoolError::Construction { .. }) => true,
            BrokerError::Io { .. } => true,
            _ => false,
        }
    }
}

impl From<std::io::Error> for BrokerError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<validator::ValidationErrors> for BrokerError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages = Vec::new();
        collect_validation_messages("", &errors, &mut messages);
        messages.sort();

        Self::config(format!("Validation failed: {}", messages.join("; ")))
    }
}

/// Flatten nested validation errors into `path: message` strings.
fn collect_validation_messages(
    prefix: &str,
    errors: &validator::ValidationErrors,
    out: &mut Vec<String>,
) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        let path =
            if prefix.is_empty() { field.to_string() } else { format!("{}.{}", prefix, field) };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                let messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                out.push(format!("{}: {}", path, messages.join(", ")));
            }
            ValidationErrorsKind::Struct(inner) => collect_validation_messages(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect_validation_messages(&format!("{}[{}]", path, index), inner, out);
                }
            }
        }
    }
}

/// Failure of a single data source client request.
///
/// Wraps whatever went wrong along the read → decrypt → connect chain with the
/// id of the data source being requested.
#[derive(thiserror::Error, Debug)]
#[error("Data source '{data_source_id}': {source}")]
pub struct DataSourceError {
    pub data_source_id: String,
    #[source]
    pub source: BrokerError,
}

impl DataSourceError {
    pub fn new(data_source_id: impl Into<String>, source: impl Into<BrokerError>) -> Self {
        Self { data_source_id: data_source_id.into(), source: source.into() }
    }

    pub fn is_not_found(&self) -> bool {
        self.source.is_not_found()
    }

    pub fn is_retryable(&self) -> bool {
        self.source.is_retryable()
    }
}
