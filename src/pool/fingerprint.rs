//! Connection parameters and the cache key derived from them.

use sha2::{Digest, Sha256};
use std::fmt;

use crate::domain::{Credential, DataSourceId};

/// Everything a factory needs to build a client for one data source.
///
/// Holds decrypted auth material. It is moved into the construction task and
/// dropped (and zeroed) when construction ends.
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    pub endpoint: String,
    pub credential: Credential,
    /// Version of the sealed credential the material was opened from
    pub credential_version: String,
}

impl ConnectionParams {
    pub fn new(
        endpoint: impl Into<String>,
        credential: Credential,
        credential_version: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            credential,
            credential_version: credential_version.into(),
        }
    }

    /// SHA-256 over endpoint, auth scheme and credential version.
    ///
    /// Secret material is not an input; a changed secret shows up as a new
    /// credential version.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.endpoint.as_bytes(),
            self.credential.scheme().as_str().as_bytes(),
            self.credential_version.as_bytes(),
        ] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part);
        }
        hex::encode(hasher.finalize())
    }
}

/// Pool cache key: data source id plus connection fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub data_source_id: DataSourceId,
    pub fingerprint: String,
}

impl CacheKey {
    pub fn new(data_source_id: &DataSourceId, params: &ConnectionParams) -> Self {
        Self { data_source_id: data_source_id.clone(), fingerprint: params.fingerprint() }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.fingerprint.get(..12).unwrap_or(&self.fingerprint);
        write!(f, "{}#{}", self.data_source_id, short)
    }
}
