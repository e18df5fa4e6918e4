//! Audit sinks: where audit records end up.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use super::{AuditError, AuditRecord};
use crate::config::{AuditSettings, AuditSinkKind};

/// Destination of audit records. `write` returns once the record is handed
/// to the destination.
#[async_trait]
pub trait AuditSink: Send + Sync {
    fn name(&self) -> &str;

    async fn write(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Build the sink selected by configuration
pub fn sink_from_settings(settings: &AuditSettings) -> Arc<dyn AuditSink> {
    match settings.sink {
        AuditSinkKind::File => Arc::new(FileAuditSink::new(&settings.file_path)),
        AuditSinkKind::Tracing => Arc::new(TracingAuditSink),
    }
}

/// Append-only JSON lines file.
///
/// The file (and its parent directory) is created on first write.
pub struct FileAuditSink {
    path: PathBuf,
    file: tokio::sync::Mutex<Option<tokio::fs::File>>,
}

impl FileAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), file: tokio::sync::Mutex::new(None) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> Result<tokio::fs::File, AuditError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AuditError::io(parent, e))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| AuditError::io(&self.path, e))
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    fn name(&self) -> &str {
        "file"
    }

    async fn write(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut guard = self.file.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
        }
        let Some(file) = guard.as_mut() else {
            return Err(AuditError::io(
                &self.path,
                std::io::Error::other("audit file handle missing"),
            ));
        };

        let written = async {
            file.write_all(&line).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = written {
            // Reopen on the next write
            *guard = None;
            return Err(AuditError::io(&self.path, e));
        }
        Ok(())
    }
}

/// Emits records as `tracing` events on the `audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn write(&self, record: &AuditRecord) -> Result<(), AuditError> {
        tracing::info!(
            target: "audit",
            requester = %record.requester,
            event_type = %record.event_type,
            data_source_id = record.data_source_id.as_ref().map(|id| id.as_str()),
            scope = record.scope.as_deref(),
            "{}",
            record.message
        );
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn write(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(record.clone());
        Ok(())
    }
}
