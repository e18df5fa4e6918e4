//! Data source broker service
//!
//! Turns a data source id into a ready-to-use [`ClusterClient`]: read the
//! data source record, open its sealed credential, fetch or build the client
//! through the pool, and audit the hand-out. Decrypted material only lives
//! until the pool has built (or found) the client.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use crate::{
    audit::{AuditEvent, ScopedAuditor},
    broker_span,
    config::{ClientSettings, DataSourceConfig},
    domain::DataSourceId,
    errors::{BrokerError, DataSourceError, Result},
    pool::{ClientFactory, ClientPool, ClusterClient, ConnectionParams, HttpClientFactory},
    services::credential_vault::CredentialVault,
    storage::{open_credential_record, read_credential, read_data_source, MetadataReader},
};

/// Service brokering access to remote data source clusters
pub struct DataSourceService {
    enabled: bool,
    pool: Arc<ClientPool>,
    eviction_task: Mutex<Option<JoinHandle<()>>>,
}

impl DataSourceService {
    /// Build the service from configuration with the HTTP client factory and
    /// start the idle sweep if one is configured.
    pub async fn setup(config: &DataSourceConfig) -> Self {
        let factory = Arc::new(HttpClientFactory::from_settings(&config.client));
        let service = Self::with_factory(&config.client, factory);
        let service = Self { enabled: config.enabled, ..service };

        if let Some(interval) = config.client.eviction_interval() {
            service.start_idle_eviction(interval);
        }

        info!(
            enabled = config.enabled,
            idle_timeout_secs = config.client.idle_timeout_seconds,
            "Data source service set up"
        );
        service
    }

    /// Build the service around a custom client factory. No background sweep
    /// is started.
    pub fn with_factory(settings: &ClientSettings, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            enabled: true,
            pool: Arc::new(ClientPool::new(factory, settings.idle_timeout())),
            eviction_task: Mutex::new(None),
        }
    }

    /// Periodically drop pooled clients that have gone idle. Replaces any
    /// sweep already running.
    pub fn start_idle_eviction(&self, interval: Duration) {
        let pool: Weak<ClientPool> = Arc::downgrade(&self.pool);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(pool) = pool.upgrade() else { break };
                if pool.is_closed() {
                    break;
                }
                let evicted = pool.evict_idle();
                if evicted > 0 {
                    debug!(evicted, "Evicted idle data source clients");
                }
            }
        });

        let mut slot = self.eviction_task.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }

    /// Get a client for a data source on behalf of the caller behind
    /// `auditor`.
    ///
    /// `metadata_reader` should be scoped to the caller so record visibility
    /// follows the caller's permissions. A successful hand-out is audited as
    /// `opensearch.dataSourceClient.call.internalUser`; failures are not.
    ///
    /// # Errors
    ///
    /// Every failure is a [`DataSourceError`] naming `id`. Check
    /// [`DataSourceError::is_not_found`] for unknown ids.
    pub async fn get_data_source_client(
        &self,
        id: &DataSourceId,
        metadata_reader: &dyn MetadataReader,
        vault: &CredentialVault,
        auditor: &ScopedAuditor,
    ) -> std::result::Result<Arc<ClusterClient>, DataSourceError> {
        let span = broker_span!("get_data_source_client", id, requester = auditor.requester());

        async {
            let client = self.connect(id, metadata_reader, vault).await.map_err(|e| {
                warn!(data_source_id = %id, error = %e, "Data source client request failed");
                DataSourceError::new(id.as_str(), e)
            })?;

            // An audit sink failure is logged by the auditor and does not
            // take the client away from the caller.
            let _ = auditor.record(AuditEvent::data_source_client_call(id)).await;

            Ok::<_, DataSourceError>(client)
        }
        .instrument(span)
        .await
    }

    async fn connect(
        &self,
        id: &DataSourceId,
        metadata_reader: &dyn MetadataReader,
        vault: &CredentialVault,
    ) -> Result<Arc<ClusterClient>> {
        if !self.enabled {
            return Err(BrokerError::config("Data source access is disabled"));
        }

        let data_source = read_data_source(metadata_reader, id).await?;
        let credential_record = read_credential(metadata_reader, &data_source.credential_id).await?;

        let credential = open_credential_record(vault, &credential_record)?;
        let params = ConnectionParams::new(
            data_source.endpoint,
            credential,
            credential_record.cipher.version(),
        );

        let client = self.pool.get_or_create(id, params).await?;
        debug!(endpoint = %client.endpoint(), "Data source client ready");
        Ok(client)
    }

    /// Drop every pooled client of a data source, e.g. after its record or
    /// credential was deleted.
    pub fn invalidate(&self, id: &DataSourceId) -> usize {
        self.pool.invalidate(id)
    }

    /// Stop the idle sweep and shut the pool down. Idempotent.
    pub async fn stop(&self) {
        let task = self.eviction_task.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take();
        if let Some(task) = task {
            task.abort();
        }
        self.pool.shutdown().await;
    }

    pub fn pool(&self) -> &ClientPool {
        &self.pool
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl std::fmt::Debug for DataSourceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSourceService")
            .field("enabled", &self.enabled)
            .field("pool", &self.pool)
            .finish()
    }
}
