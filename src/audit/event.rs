//! Audit event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::DataSourceId;

/// Event type recorded when the broker hands out a client on a caller's behalf
pub const DATA_SOURCE_CLIENT_CALL: &str = "opensearch.dataSourceClient.call.internalUser";

/// Identity recorded when a request carries no forwarded identity
pub const UNKNOWN_REQUESTER: &str = "unknown";

/// What a component reports to the auditor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub event_type: String,
    pub message: String,
    pub data_source_id: Option<DataSourceId>,
}

impl AuditEvent {
    pub fn new(event_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self { event_type: event_type.into(), message: message.into(), data_source_id: None }
    }

    /// Successful client hand-out for a data source
    pub fn data_source_client_call(id: &DataSourceId) -> Self {
        Self {
            event_type: DATA_SOURCE_CLIENT_CALL.to_string(),
            message: id.to_string(),
            data_source_id: Some(id.clone()),
        }
    }
}

/// One line of the audit trail. Write-once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub requester: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source_id: Option<DataSourceId>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub message: String,
}

impl AuditRecord {
    /// Stamp an event with the requester. The message reads
    /// `"<requester> accessing <event message>"`.
    pub fn from_event(event: AuditEvent, requester: &str, scope: Option<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            requester: requester.to_string(),
            scope,
            message: format!("{} accessing {}", requester, event.message),
            data_source_id: event.data_source_id,
            event_type: event.event_type,
        }
    }
}
