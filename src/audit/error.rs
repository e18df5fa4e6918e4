use std::path::PathBuf;
use thiserror::Error;

/// Audit sink failures
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit sink I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Audit record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuditError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
