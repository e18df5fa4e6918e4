//! # Access Auditing
//!
//! Every credential-bearing access the broker performs on behalf of a caller
//! is recorded as one structured [`AuditRecord`]. A [`ScopedAuditor`] is
//! created per inbound request and stamps each event with the requester's
//! forwarded identity before handing it to the configured [`AuditSink`].
//!
//! Records never contain credential material; the message names the data
//! source that was accessed and who asked for it.

mod context;
mod error;
mod event;
mod sink;

pub use context::{RequestContext, StaticRequestContext, FORWARDED_FOR_HEADER};
pub use error::AuditError;
pub use event::{AuditEvent, AuditRecord, DATA_SOURCE_CLIENT_CALL, UNKNOWN_REQUESTER};
pub use sink::{sink_from_settings, AuditSink, FileAuditSink, MemoryAuditSink, TracingAuditSink};

use std::sync::Arc;
use tracing::error;

/// Per-request audit recorder.
#[derive(Clone)]
pub struct ScopedAuditor {
    requester: String,
    scope: Option<String>,
    sink: Arc<dyn AuditSink>,
}

impl ScopedAuditor {
    /// Bind an auditor to the identity carried by `context`.
    pub fn new(context: &dyn RequestContext, sink: Arc<dyn AuditSink>) -> Self {
        let requester =
            context.forwarded_identity().unwrap_or_else(|| UNKNOWN_REQUESTER.to_string());
        Self { requester, scope: None, sink }
    }

    /// Label subsequent records with a named scope, e.g. the route that
    /// issued them.
    pub fn with_scope(mut self, name: impl Into<String>) -> Self {
        self.scope = Some(name.into());
        self
    }

    pub fn requester(&self) -> &str {
        &self.requester
    }

    /// Append one record for `event`.
    ///
    /// Sink failures are logged and returned; callers decide whether they
    /// matter.
    pub async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        let record = AuditRecord::from_event(event, &self.requester, self.scope.clone());

        self.sink.write(&record).await.inspect_err(|e| {
            error!(
                sink = %self.sink.name(),
                event_type = %record.event_type,
                error = %e,
                "Failed to write audit record"
            );
        })
    }
}

impl std::fmt::Debug for ScopedAuditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedAuditor")
            .field("requester", &self.requester)
            .field("scope", &self.scope)
            .field("sink", &self.sink.name())
            .finish()
    }
}
