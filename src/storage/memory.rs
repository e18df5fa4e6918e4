//! DashMap-backed metadata store.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use super::{MetadataReader, MetadataStore, Result, StorageError, StoredRecord};

/// In-process metadata store keyed by `(kind, id)`.
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetadataStore {
    records: Arc<DashMap<(String, String), StoredRecord>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn key(kind: &str, id: &str) -> (String, String) {
        (kind.to_string(), id.to_string())
    }
}

#[async_trait]
impl MetadataReader for InMemoryMetadataStore {
    async fn get(&self, kind: &str, id: &str) -> Result<StoredRecord> {
        self.records
            .get(&Self::key(kind, id))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::not_found(kind, id))
    }

    async fn find(&self, kind: &str) -> Result<Vec<StoredRecord>> {
        let mut records: Vec<StoredRecord> = self
            .records
            .iter()
            .filter(|entry| entry.key().0 == kind)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn create(&self, record: StoredRecord) -> Result<StoredRecord> {
        match self.records.entry(Self::key(&record.kind, &record.id)) {
            Entry::Occupied(_) => Err(StorageError::conflict(&record.kind, &record.id)),
            Entry::Vacant(slot) => {
                debug!(kind = %record.kind, id = %record.id, "Created record");
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn update(&self, record: StoredRecord) -> Result<StoredRecord> {
        match self.records.get_mut(&Self::key(&record.kind, &record.id)) {
            Some(mut existing) => {
                *existing = record.clone();
                debug!(kind = %record.kind, id = %record.id, "Updated record");
                Ok(record)
            }
            None => Err(StorageError::not_found(&record.kind, &record.id)),
        }
    }
}
