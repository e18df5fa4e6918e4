use thiserror::Error;

/// Credential vault failures.
///
/// Messages describe what failed, never the bytes involved.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The authentication tag or the bound key context did not verify.
    #[error("Credential integrity check failed: {reason}")]
    Integrity { reason: String },

    /// The record was sealed under a wrapping key that is not loaded.
    #[error("Wrapping key '{namespace}/{name}' is not available")]
    KeyUnavailable { name: String, namespace: String },

    /// Configured key material is unusable.
    #[error("Invalid wrapping key: {reason}")]
    InvalidKey { reason: String },

    /// The plaintext payload could not be (de)serialized.
    #[error("Credential payload is malformed: {reason}")]
    Payload { reason: String },

    /// RNG or cipher setup failure.
    #[error("Vault internal error: {message}")]
    Internal { message: String },
}

impl VaultError {
    pub fn integrity(reason: impl Into<String>) -> Self {
        Self::Integrity { reason: reason.into() }
    }

    pub fn key_unavailable(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::KeyUnavailable { name: name.into(), namespace: namespace.into() }
    }

    pub fn invalid_key(reason: impl Into<String>) -> Self {
        Self::InvalidKey { reason: reason.into() }
    }

    /// Describe a payload error by category and position only; serde messages
    /// can quote the offending input.
    pub fn payload(error: &serde_json::Error) -> Self {
        Self::Payload {
            reason: format!(
                "{:?} error at line {} column {}",
                error.classify(),
                error.line(),
                error.column()
            ),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }
}
