//! # Metadata Store Access
//!
//! The host application's generic persistence layer is consumed through a
//! narrow contract: typed, opaque records addressed by `(kind, id)`.
//!
//! - [`MetadataReader`]: `get` and `find`, used by the broker
//! - [`MetadataStore`]: adds `create` and `update`
//! - [`CredentialInterceptor`]: a [`MetadataStore`] wrapper that seals
//!   credential records before they reach the inner store
//! - [`InMemoryMetadataStore`]: a DashMap-backed store for embedding and tests
//!
//! Reads never decrypt. Sealed credentials stay sealed until the broker opens
//! one on demand.

pub mod error;
pub mod interceptor;
pub mod memory;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::instrument;

use crate::domain::{CredentialId, CredentialRecord, DataSourceId, DataSourceRecord};

pub use error::{Result, StorageError};
pub use interceptor::{open_credential_record, seal_credential_record, CredentialInterceptor};
pub use memory::InMemoryMetadataStore;

/// Record kind of data source registrations
pub const DATA_SOURCE_KIND: &str = "data-source";

/// Record kind of sealed credentials
pub const CREDENTIAL_KIND: &str = "credential";

/// An opaque typed record as held by the metadata store.
///
/// `attributes` is a JSON object; the id is kept out of it and re-attached
/// when decoding into a domain type.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct StoredRecord {
    pub kind: String,
    pub id: String,
    pub attributes: Value,
}

impl StoredRecord {
    pub fn new(kind: impl Into<String>, id: impl Into<String>, attributes: Value) -> Self {
        Self { kind: kind.into(), id: id.into(), attributes }
    }

    /// Build a record from a domain value whose serialized form has an `id`.
    pub fn encode<T: Serialize>(kind: &str, value: &T) -> Result<Self> {
        let mut attributes = serde_json::to_value(value).map_err(|e| {
            StorageError::invalid_record(kind, "<new>", format!("serialization failed: {}", e))
        })?;

        let id = attributes
            .as_object_mut()
            .and_then(|object| object.remove("id"))
            .and_then(|id| id.as_str().map(str::to_string))
            .ok_or_else(|| StorageError::invalid_record(kind, "<new>", "missing string id"))?;

        Ok(Self::new(kind, id, attributes))
    }

    /// Decode the attributes, plus the id, into a domain value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let mut attributes = self.attributes.clone();
        let object = attributes.as_object_mut().ok_or_else(|| {
            StorageError::invalid_record(&self.kind, &self.id, "attributes are not an object")
        })?;
        object.insert("id".to_string(), Value::String(self.id.clone()));

        serde_json::from_value(attributes).map_err(|e| {
            StorageError::invalid_record(&self.kind, &self.id, format!("{:?} error", e.classify()))
        })
    }

    /// String attribute lookup
    pub fn attribute_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }
}

/// Read side of the metadata store.
#[async_trait]
pub trait MetadataReader: Send + Sync {
    /// Fetch one record.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if no record of that kind and id exists
    async fn get(&self, kind: &str, id: &str) -> Result<StoredRecord>;

    /// List every record of a kind.
    async fn find(&self, kind: &str) -> Result<Vec<StoredRecord>>;
}

/// Write side of the metadata store.
#[async_trait]
pub trait MetadataStore: MetadataReader {
    /// Insert a new record.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Conflict`] if the record already exists
    async fn create(&self, record: StoredRecord) -> Result<StoredRecord>;

    /// Replace an existing record.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if the record does not exist
    async fn update(&self, record: StoredRecord) -> Result<StoredRecord>;
}

/// Read and decode a data source record.
#[instrument(skip(reader), fields(data_source_id = %id), name = "read_data_source")]
pub async fn read_data_source(
    reader: &dyn MetadataReader,
    id: &DataSourceId,
) -> Result<DataSourceRecord> {
    reader.get(DATA_SOURCE_KIND, id.as_str()).await?.decode()
}

/// Read and decode a sealed credential record. Nothing is decrypted.
#[instrument(skip(reader), fields(credential_id = %id), name = "read_credential")]
pub async fn read_credential(
    reader: &dyn MetadataReader,
    id: &CredentialId,
) -> Result<CredentialRecord> {
    reader.get(CREDENTIAL_KIND, id.as_str()).await?.decode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_strips_id_and_decode_restores_it() {
        let record =
            DataSourceRecord::new("ds-1", "Logs", "https://cluster.example:9200", "cred-1");
        let stored = StoredRecord::encode(DATA_SOURCE_KIND, &record).unwrap();

        assert_eq!(stored.id, "ds-1");
        assert!(stored.attributes.get("id").is_none());
        assert_eq!(stored.attribute_str("title"), Some("Logs"));

        let decoded: DataSourceRecord = stored.decode().unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_decode_rejects_non_object_attributes() {
        let stored = StoredRecord::new(DATA_SOURCE_KIND, "ds-1", json!("not an object"));
        let err = stored.decode::<DataSourceRecord>().unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord { .. }));
    }

    #[test]
    fn test_decode_reports_shape_errors_without_values() {
        let stored =
            StoredRecord::new(DATA_SOURCE_KIND, "ds-1", json!({"title": "Logs", "endpoint": 42}));
        let err = stored.decode::<DataSourceRecord>().unwrap_err();
        assert!(!err.to_string().contains("42"));
    }
}
