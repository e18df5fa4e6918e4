//! Data source records: what a tenant sees when listing remote clusters.

use serde::{Deserialize, Serialize};

use super::id::{CredentialId, DataSourceId};

/// A remote cluster registration.
///
/// The endpoint is an opaque connection string handed to the client factory
/// verbatim. Authentication lives in a separate sealed credential record
/// referenced by `credential_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceRecord {
    pub id: DataSourceId,
    pub title: String,
    #[serde(rename = "type")]
    pub data_source_type: String,
    pub endpoint: String,
    pub credential_id: CredentialId,
}

impl DataSourceRecord {
    pub fn new(
        id: impl Into<DataSourceId>,
        title: impl Into<String>,
        endpoint: impl Into<String>,
        credential_id: impl Into<CredentialId>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            data_source_type: "opensearch".to_string(),
            endpoint: endpoint.into(),
            credential_id: credential_id.into(),
        }
    }
}
