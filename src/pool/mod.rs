//! # Client Pool
//!
//! Caches live [`ClusterClient`]s per data source and connection fingerprint.
//!
//! Each cache key moves through `Absent -> Building -> Ready`. The first
//! caller for an absent key spawns the one construction task; every caller
//! arriving while it runs awaits the same shared result. A failed build
//! removes the key again so the next call retries.
//!
//! Construction runs in its own tokio task, so a waiter that gives up never
//! aborts a build other callers are waiting on. Map guards are only held for
//! map updates and never across an await.

mod client;
mod error;
mod fingerprint;

pub use client::{ClientFactory, ClusterClient, HttpClientFactory};
pub use error::PoolError;
pub use fingerprint::{CacheKey, ConnectionParams};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{join_all, BoxFuture, Shared};
use futures::FutureExt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::domain::DataSourceId;

type BuildResult = Result<Arc<ClusterClient>, PoolError>;
type BuildFuture = Shared<BoxFuture<'static, BuildResult>>;

struct ReadyEntry {
    build_id: u64,
    client: Arc<ClusterClient>,
    created_at: Instant,
    last_used: Instant,
}

enum Slot {
    Building { build_id: u64, result: BuildFuture },
    Ready(ReadyEntry),
}

impl Slot {
    fn is_build(&self, id: u64) -> bool {
        matches!(self, Slot::Building { build_id, .. } if *build_id == id)
    }

    fn is_ready(&self) -> bool {
        matches!(self, Slot::Ready(_))
    }

    fn ready_build(&self) -> Option<u64> {
        match self {
            Slot::Ready(entry) => Some(entry.build_id),
            Slot::Building { .. } => None,
        }
    }
}

type Entries = Arc<DashMap<CacheKey, Slot>>;

/// Concurrent, single-flight cache of cluster clients.
pub struct ClientPool {
    entries: Entries,
    factory: Arc<dyn ClientFactory>,
    idle_timeout: Duration,
    closed: Arc<AtomicBool>,
    next_build: AtomicU64,
}

impl ClientPool {
    pub fn new(factory: Arc<dyn ClientFactory>, idle_timeout: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            factory,
            idle_timeout,
            closed: Arc::new(AtomicBool::new(false)),
            next_build: AtomicU64::new(1),
        }
    }

    /// Return the cached client for `(id, fingerprint(params))`, building it
    /// at most once across concurrent callers.
    ///
    /// # Errors
    ///
    /// - [`PoolError::Closed`] after [`ClientPool::shutdown`]
    /// - [`PoolError::Construction`] if the factory failed; every caller
    ///   waiting on that build receives the same error
    #[instrument(skip(self, params), fields(data_source_id = %id), name = "pool_get_or_create")]
    pub async fn get_or_create(&self, id: &DataSourceId, params: ConnectionParams) -> BuildResult {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        let key = CacheKey::new(id, &params);
        let pending = match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => match occupied.get_mut() {
                Slot::Ready(entry) => {
                    entry.last_used = Instant::now();
                    debug!(key = %key, "Pool hit");
                    return Ok(entry.client.clone());
                }
                Slot::Building { result, .. } => {
                    debug!(key = %key, "Joining in-flight construction");
                    result.clone()
                }
            },
            Entry::Vacant(vacant) => {
                // Checked under the shard lock so shutdown's scan sees this build.
                if self.is_closed() {
                    return Err(PoolError::Closed);
                }
                let build_id = self.next_build.fetch_add(1, Ordering::Relaxed);
                let result = self.spawn_build(key.clone(), build_id, params);
                vacant.insert(Slot::Building { build_id, result: result.clone() });
                result
            }
        };

        pending.await
    }

    fn spawn_build(&self, key: CacheKey, build_id: u64, params: ConnectionParams) -> BuildFuture {
        let entries = self.entries.clone();
        let factory = self.factory.clone();
        let task_key = key.clone();
        let task_entries = entries.clone();

        debug!(key = %key, build_id, "Starting client construction");

        let handle = tokio::spawn(async move {
            let key = task_key;
            let entries = task_entries;
            let result = factory.build(&key.data_source_id, &params).await.map(Arc::new);
            drop(params);

            match &result {
                Ok(client) => Self::promote(&entries, &key, build_id, client.clone()),
                Err(e) => {
                    warn!(key = %key, error = %e, "Client construction failed");
                    entries.remove_if(&key, |_, slot| slot.is_build(build_id));
                }
            }
            result
        });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(join_error) => {
                    error!(key = %key, error = %join_error, "Client construction task aborted");
                    entries.remove_if(&key, |_, slot| slot.is_build(build_id));
                    Err(PoolError::construction("construction task aborted"))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Move a finished build to `Ready`, then reclaim older generations of
    /// the same data source.
    fn promote(entries: &Entries, key: &CacheKey, build_id: u64, client: Arc<ClusterClient>) {
        let promoted = match entries.get_mut(key) {
            Some(mut slot) if slot.is_build(build_id) => {
                let now = Instant::now();
                *slot = Slot::Ready(ReadyEntry { build_id, client, created_at: now, last_used: now });
                true
            }
            _ => false,
        };

        if !promoted {
            debug!(key = %key, "Build finished for an invalidated key, not caching");
            return;
        }
        debug!(key = %key, build_id, "Client ready");

        Self::reclaim_older_generations(entries, &key.data_source_id);
    }

    /// Keep only the newest ready generation of a data source.
    ///
    /// Generations are ordered by build id, not by completion, so a slow build
    /// started before a rotation never displaces the client built after it.
    /// Reclaimed clients are only dropped from the map; callers still holding
    /// one keep using it until they let go.
    fn reclaim_older_generations(entries: &Entries, id: &DataSourceId) {
        let generations: Vec<(CacheKey, u64)> = entries
            .iter()
            .filter(|entry| &entry.key().data_source_id == id)
            .filter_map(|entry| entry.value().ready_build().map(|b| (entry.key().clone(), b)))
            .collect();

        let Some(newest) = generations.iter().map(|(_, build_id)| *build_id).max() else {
            return;
        };

        for (stale_key, _) in generations.into_iter().filter(|(_, build_id)| *build_id < newest) {
            let removed = entries.remove_if(&stale_key, |_, slot| {
                slot.ready_build().is_some_and(|build_id| build_id < newest)
            });
            if removed.is_some() {
                info!(key = %stale_key, "Reclaiming client with outdated connection parameters");
            }
        }
    }

    /// Drop every entry of a data source. Builds in flight still deliver to
    /// their waiters but are not cached. Dropped clients stay usable by
    /// callers already holding them.
    pub fn invalidate(&self, id: &DataSourceId) -> usize {
        let keys: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|entry| &entry.key().data_source_id == id)
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in keys {
            if self.entries.remove(&key).is_some() {
                removed += 1;
            }
        }

        if removed > 0 {
            info!(data_source_id = %id, removed, "Invalidated pooled clients");
        }
        removed
    }

    /// Remove ready clients unused for longer than the idle timeout. Only the
    /// pool's reference is dropped.
    pub fn evict_idle(&self) -> usize {
        let timeout = self.idle_timeout;
        let idle = |slot: &Slot| match slot {
            Slot::Ready(entry) => entry.last_used.elapsed() >= timeout,
            Slot::Building { .. } => false,
        };

        let keys: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|entry| idle(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0;
        for key in keys {
            if let Some((_, Slot::Ready(entry))) = self.entries.remove_if(&key, |_, s| idle(s)) {
                debug!(
                    key = %key,
                    age_secs = entry.created_at.elapsed().as_secs(),
                    "Evicting idle client"
                );
                evicted += 1;
            }
        }
        evicted
    }

    /// Stop new construction, wait for builds in flight, then close every
    /// ready client. Safe to call more than once.
    pub async fn shutdown(&self) {
        let first = !self.closed.swap(true, Ordering::SeqCst);

        loop {
            let pending: Vec<BuildFuture> = self
                .entries
                .iter()
                .filter_map(|entry| match entry.value() {
                    Slot::Building { result, .. } => Some(result.clone()),
                    Slot::Ready(_) => None,
                })
                .collect();
            if pending.is_empty() {
                break;
            }
            debug!(count = pending.len(), "Waiting for in-flight client construction");
            join_all(pending).await;
        }

        let keys: Vec<CacheKey> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        let mut closed = 0;
        for key in keys {
            if let Some((_, Slot::Ready(entry))) = self.entries.remove(&key) {
                entry.client.close();
                closed += 1;
            }
        }

        if first {
            info!(closed_clients = closed, "Client pool shut down");
        }
    }

    /// Number of ready clients
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|entry| entry.value().is_ready()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }
}

impl std::fmt::Debug for ClientPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientPool")
            .field("entries", &self.entries.len())
            .field("idle_timeout", &self.idle_timeout)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AuthScheme, Credential};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    /// Factory that counts builds and can be told to fail or to wait.
    #[derive(Default)]
    struct CountingFactory {
        builds: AtomicUsize,
        fail: AtomicBool,
        gate: Option<Arc<Notify>>,
        /// Hold only builds of this credential version at `gate`
        gated_version: Option<String>,
    }

    #[async_trait]
    impl ClientFactory for CountingFactory {
        async fn build(
            &self,
            data_source_id: &DataSourceId,
            params: &ConnectionParams,
        ) -> Result<ClusterClient, PoolError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                let held = match &self.gated_version {
                    Some(version) => *version == params.credential_version,
                    None => true,
                };
                if held {
                    gate.notified().await;
                }
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(PoolError::construction("cluster unreachable"));
            }
            let endpoint = url::Url::parse(&params.endpoint)
                .map_err(|e| PoolError::construction(e.to_string()))?;
            Ok(ClusterClient::new(
                data_source_id.clone(),
                endpoint,
                AuthScheme::NoAuth,
                reqwest::Client::new(),
            ))
        }
    }

    fn params(version: &str) -> ConnectionParams {
        ConnectionParams::new("http://cluster.example:9200", Credential::NoAuth, version)
    }

    fn pool(factory: Arc<CountingFactory>) -> ClientPool {
        ClientPool::new(factory, Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_second_call_is_a_hit() {
        let factory = Arc::new(CountingFactory::default());
        let pool = pool(factory.clone());
        let id = DataSourceId::from("ds-1");

        let a = pool.get_or_create(&id, params("v1")).await.unwrap();
        let b = pool.get_or_create(&id, params("v1")).await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_build() {
        let gate = Arc::new(Notify::new());
        let factory = Arc::new(CountingFactory { gate: Some(gate.clone()), ..Default::default() });
        let pool = Arc::new(pool(factory.clone()));
        let id = DataSourceId::from("ds-1");

        let mut handles = Vec::new();
        for _ in 0..16 {
            let pool = pool.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move { pool.get_or_create(&id, params("v1")).await }));
        }

        while factory.builds.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        gate.notify_one();

        let clients: Vec<_> =
            futures::future::join_all(handles).await.into_iter().map(|r| r.unwrap().unwrap()).collect();
        assert!(clients.iter().all(|c| Arc::ptr_eq(c, &clients[0])));
        assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let factory = Arc::new(CountingFactory::default());
        factory.fail.store(true, Ordering::SeqCst);
        let pool = pool(factory.clone());
        let id = DataSourceId::from("ds-1");

        let err = pool.get_or_create(&id, params("v1")).await.unwrap_err();
        assert!(matches!(err, PoolError::Construction { .. }));
        assert!(pool.is_empty());

        factory.fail.store(false, Ordering::SeqCst);
        pool.get_or_create(&id, params("v1")).await.unwrap();
        assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_abort_build() {
        let gate = Arc::new(Notify::new());
        let factory = Arc::new(CountingFactory { gate: Some(gate.clone()), ..Default::default() });
        let pool = Arc::new(pool(factory.clone()));
        let id = DataSourceId::from("ds-1");

        let waiter = {
            let pool = pool.clone();
            let id = id.clone();
            tokio::spawn(async move { pool.get_or_create(&id, params("v1")).await })
        };
        while factory.builds.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        waiter.abort();
        gate.notify_one();

        pool.shutdown().await;
        assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_new_fingerprint_reclaims_old_generation() {
        let factory = Arc::new(CountingFactory::default());
        let pool = pool(factory.clone());
        let id = DataSourceId::from("ds-1");

        let old = pool.get_or_create(&id, params("v1")).await.unwrap();
        let new = pool.get_or_create(&id, params("v2")).await.unwrap();

        assert!(!Arc::ptr_eq(&old, &new));
        // Dropped from the pool, still usable by its holder
        assert!(!old.is_closed());
        assert!(!new.is_closed());
        assert_eq!(pool.len(), 1);

        let again = pool.get_or_create(&id, params("v2")).await.unwrap();
        assert!(Arc::ptr_eq(&new, &again));
        assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slow_older_build_does_not_displace_newer_generation() {
        let gate = Arc::new(Notify::new());
        let factory = Arc::new(CountingFactory {
            gate: Some(gate.clone()),
            gated_version: Some("v1".to_string()),
            ..Default::default()
        });
        let pool = Arc::new(pool(factory.clone()));
        let id = DataSourceId::from("ds-1");

        let slow = {
            let pool = pool.clone();
            let id = id.clone();
            tokio::spawn(async move { pool.get_or_create(&id, params("v1")).await })
        };
        while factory.builds.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let current = pool.get_or_create(&id, params("v2")).await.unwrap();
        gate.notify_one();
        let stale = slow.await.unwrap().unwrap();

        assert!(!Arc::ptr_eq(&stale, &current));
        assert!(!current.is_closed());
        assert!(!stale.is_closed());
        assert_eq!(pool.len(), 1);

        let again = pool.get_or_create(&id, params("v2")).await.unwrap();
        assert!(Arc::ptr_eq(&current, &again));
        assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_drops_entries() {
        let factory = Arc::new(CountingFactory::default());
        let pool = pool(factory.clone());
        let id = DataSourceId::from("ds-1");
        let other = DataSourceId::from("ds-2");

        let client = pool.get_or_create(&id, params("v1")).await.unwrap();
        pool.get_or_create(&other, params("v1")).await.unwrap();

        assert_eq!(pool.invalidate(&id), 1);
        assert!(!client.is_closed());
        assert_eq!(pool.len(), 1);

        let rebuilt = pool.get_or_create(&id, params("v1")).await.unwrap();
        assert!(!Arc::ptr_eq(&client, &rebuilt));
        assert_eq!(pool.invalidate(&id), 0);
    }

    #[tokio::test]
    async fn test_evict_idle() {
        let factory = Arc::new(CountingFactory::default());
        let pool = ClientPool::new(factory, Duration::ZERO);
        let client = pool.get_or_create(&DataSourceId::from("ds-1"), params("v1")).await.unwrap();

        assert_eq!(pool.evict_idle(), 1);
        assert!(!client.is_closed());
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_refuses_new_work() {
        let factory = Arc::new(CountingFactory::default());
        let pool = pool(factory);
        let id = DataSourceId::from("ds-1");
        let client = pool.get_or_create(&id, params("v1")).await.unwrap();

        pool.shutdown().await;
        pool.shutdown().await;

        assert!(pool.is_closed());
        assert!(client.is_closed());
        assert!(pool.is_empty());
        assert_eq!(pool.get_or_create(&id, params("v1")).await.unwrap_err(), PoolError::Closed);
    }
}
