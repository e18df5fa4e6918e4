use thiserror::Error;

/// Client pool failures.
///
/// Cloneable because a single construction result is fanned out to every
/// caller waiting on the same cache key.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    /// The factory could not build a client. Not cached; the next call retries.
    #[error("Client construction failed: {message}")]
    Construction { message: String },

    /// The pool (or the client) has been shut down.
    #[error("Client pool is closed")]
    Closed,

    /// A request issued through a pooled client failed.
    #[error("Cluster request failed: {message}")]
    Request { message: String },
}

impl PoolError {
    pub fn construction(message: impl Into<String>) -> Self {
        Self::Construction { message: message.into() }
    }

    pub fn request(message: impl Into<String>) -> Self {
        Self::Request { message: message.into() }
    }
}
