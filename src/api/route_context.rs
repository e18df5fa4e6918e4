//! Per-request data source access for route handlers.
//!
//! A host registers one [`DataSourceRouteContext`] at startup. For every
//! inbound request it derives a [`RouteDataSourceClient`] bound to that
//! request's auditor and metadata view, so handlers can simply call
//! `get_client(id)`.

use http::{HeaderMap, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::audit::{AuditSink, ScopedAuditor};
use crate::domain::DataSourceId;
use crate::errors::{BrokerError, DataSourceError, PoolError, StorageError};
use crate::pool::ClusterClient;
use crate::services::credential_vault::CredentialVault;
use crate::services::data_source_service::DataSourceService;
use crate::storage::MetadataReader;

/// Error surfaced to route handlers. The message names the failing data source.
#[derive(Debug, Error)]
#[error("Data Source Error: {message}")]
pub struct DataSourceClientError {
    pub message: String,
    status: StatusCode,
    #[source]
    source: Option<DataSourceError>,
}

impl DataSourceClientError {
    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn error_kind(&self) -> &'static str {
        match self.status {
            StatusCode::NOT_FOUND => "not_found",
            StatusCode::BAD_GATEWAY => "bad_gateway",
            StatusCode::SERVICE_UNAVAILABLE => "service_unavailable",
            _ => "internal_error",
        }
    }

    /// JSON body for an HTTP error response
    pub fn body(&self) -> ErrorBody {
        ErrorBody { error: self.error_kind(), message: self.message.clone() }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl From<DataSourceError> for DataSourceClientError {
    fn from(err: DataSourceError) -> Self {
        let status = match &err.source {
            BrokerError::Storage(StorageError::NotFound { .. }) => StatusCode::NOT_FOUND,
            BrokerError::Pool(PoolError::Construction { .. } | PoolError::Request { .. }) => {
                StatusCode::BAD_GATEWAY
            }
            BrokerError::Pool(PoolError::Closed) | BrokerError::Config { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        Self { message: err.to_string(), status, source: Some(err) }
    }
}

/// Process-wide pieces every request shares
#[derive(Clone)]
pub struct DataSourceRouteContext {
    service: Arc<DataSourceService>,
    vault: Arc<CredentialVault>,
    audit_sink: Arc<dyn AuditSink>,
}

impl DataSourceRouteContext {
    pub fn new(
        service: Arc<DataSourceService>,
        vault: Arc<CredentialVault>,
        audit_sink: Arc<dyn AuditSink>,
    ) -> Self {
        Self { service, vault, audit_sink }
    }

    /// Bind access to one inbound request.
    ///
    /// `metadata_reader` should be the caller-scoped view of the metadata store.
    pub fn for_request(
        &self,
        headers: &HeaderMap,
        metadata_reader: Arc<dyn MetadataReader>,
    ) -> RouteDataSourceClient {
        RouteDataSourceClient {
            service: self.service.clone(),
            vault: self.vault.clone(),
            metadata_reader,
            auditor: ScopedAuditor::new(headers, self.audit_sink.clone()),
        }
    }

    pub fn service(&self) -> &DataSourceService {
        &self.service
    }
}

/// Data source access bound to one request
pub struct RouteDataSourceClient {
    service: Arc<DataSourceService>,
    vault: Arc<CredentialVault>,
    metadata_reader: Arc<dyn MetadataReader>,
    auditor: ScopedAuditor,
}

impl RouteDataSourceClient {
    pub async fn get_client(
        &self,
        data_source_id: &str,
    ) -> Result<Arc<ClusterClient>, DataSourceClientError> {
        let id = DataSourceId::from(data_source_id);
        self.service
            .get_data_source_client(&id, self.metadata_reader.as_ref(), &self.vault, &self.auditor)
            .await
            .map_err(DataSourceClientError::from)
    }

    pub fn auditor(&self) -> &ScopedAuditor {
        &self.auditor
    }
}
