//! Common test utilities for all integration tests.
//!
//! Provides a seeded broker harness: vault, credential-sealing store, memory
//! audit sink and a client factory that counts constructions.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use datasource_broker::audit::{AuditSink, MemoryAuditSink, ScopedAuditor, StaticRequestContext};
use datasource_broker::config::ClientSettings;
use datasource_broker::domain::{AuthScheme, DataSourceId, DataSourceRecord};
use datasource_broker::pool::{ClientFactory, ClusterClient, ConnectionParams, PoolError};
use datasource_broker::services::{CredentialVault, DataSourceService, WrappingKey};
use datasource_broker::storage::{
    CredentialInterceptor, InMemoryMetadataStore, MetadataStore, StoredRecord, CREDENTIAL_KIND,
    DATA_SOURCE_KIND,
};

pub const TEST_KEY_MATERIAL: [u8; 32] = [42u8; 32];

pub fn test_vault() -> Arc<CredentialVault> {
    Arc::new(CredentialVault::new(WrappingKey::new(
        "test-wrapping-key",
        "default",
        TEST_KEY_MATERIAL,
    )))
}

/// Client factory that records every construction.
///
/// Construction can be held at a gate, made to fail, or slowed down.
#[derive(Default)]
pub struct RecordingFactory {
    pub builds: AtomicUsize,
    pub fail: AtomicBool,
    pub gate: Option<Arc<Notify>>,
    pub delay: Option<Duration>,
    pub seen_schemes: std::sync::Mutex<Vec<AuthScheme>>,
}

impl RecordingFactory {
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self { gate: Some(gate), ..Default::default() }
    }

    pub fn slow(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Default::default() }
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ClientFactory for RecordingFactory {
    async fn build(
        &self,
        data_source_id: &DataSourceId,
        params: &ConnectionParams,
    ) -> Result<ClusterClient, PoolError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.seen_schemes.lock().unwrap().push(params.credential.scheme());

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(PoolError::construction("cluster unreachable"));
        }

        let endpoint =
            url::Url::parse(&params.endpoint).map_err(|e| PoolError::construction(e.to_string()))?;
        Ok(ClusterClient::new(
            data_source_id.clone(),
            endpoint,
            params.credential.scheme(),
            reqwest::Client::new(),
        ))
    }
}

/// Everything a broker test needs, wired together.
pub struct TestBroker {
    pub vault: Arc<CredentialVault>,
    pub store: CredentialInterceptor<InMemoryMetadataStore>,
    pub sink: MemoryAuditSink,
    pub factory: Arc<RecordingFactory>,
    pub service: DataSourceService,
}

impl TestBroker {
    pub fn new() -> Self {
        Self::with_factory(RecordingFactory::default())
    }

    pub fn with_factory(factory: RecordingFactory) -> Self {
        let vault = test_vault();
        let factory = Arc::new(factory);
        let service = DataSourceService::with_factory(&ClientSettings::default(), factory.clone());

        Self {
            store: CredentialInterceptor::new(InMemoryMetadataStore::new(), vault.clone()),
            vault,
            sink: MemoryAuditSink::new(),
            factory,
            service,
        }
    }

    pub fn auditor(&self, requester: &str) -> ScopedAuditor {
        let sink: Arc<dyn AuditSink> = Arc::new(self.sink.clone());
        ScopedAuditor::new(&StaticRequestContext::new(requester), sink)
    }

    /// Store a plaintext credential through the sealing interceptor.
    pub async fn put_credential(&self, id: &str, credentials: Value) {
        self.store
            .create(credential_record(id, credentials))
            .await
            .expect("credential should seal and store");
    }

    pub async fn rotate_credential(&self, id: &str, credentials: Value) {
        self.store
            .update(credential_record(id, credentials))
            .await
            .expect("credential should reseal and store");
    }

    pub async fn put_data_source(&self, id: &str, endpoint: &str, credential_id: &str) {
        let record = DataSourceRecord::new(id, format!("{} title", id), endpoint, credential_id);
        self.store
            .create(StoredRecord::encode(DATA_SOURCE_KIND, &record).unwrap())
            .await
            .expect("data source should store");
    }

    /// Seed `ds-1` backed by `cred-1` (username/password)
    pub async fn seeded() -> Self {
        let broker = Self::new();
        broker.seed_default().await;
        broker
    }

    pub async fn seed_default(&self) {
        self.put_credential("cred-1", basic_credentials("admin", "s3cr3t-pass")).await;
        self.put_data_source("ds-1", "http://cluster-one.example:9200", "cred-1").await;
    }

    pub async fn get(&self, id: &str, requester: &str) -> Result<Arc<ClusterClient>, datasource_broker::DataSourceError> {
        self.service
            .get_data_source_client(&DataSourceId::from(id), &self.store, &self.vault, &self.auditor(requester))
            .await
    }
}

pub fn credential_record(id: &str, credentials: Value) -> StoredRecord {
    StoredRecord::new(
        CREDENTIAL_KIND,
        id,
        json!({
            "name": format!("{}-name", id),
            "namespace": "tenant-a",
            "credentials": credentials,
        }),
    )
}

pub fn basic_credentials(username: &str, password: &str) -> Value {
    json!({"scheme": "username_password", "username": username, "password": password})
}

pub fn api_key_credentials(key: &str) -> Value {
    json!({"scheme": "api_key", "api_key": key})
}
