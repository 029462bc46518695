//! Connection cache: one live connection per tenant, established lazily.
//!
//! [`ConnectionCache::acquire`] serves cache hits from a `DashMap` without
//! suspending. Misses enter a per-tenant creation lock (unrelated tenants
//! never contend), re-check the cache under the lock so a burst of first
//! requests collapses into a single factory call, and publish the new entry
//! only after the handshake succeeded. Failed or timed-out creations leave
//! nothing behind, so the next caller retries from scratch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use coursegate_core::messages::ActiveConnection;
use coursegate_core::{ClockSource, ReadinessState, TenantId, TenantRecord};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::entry::ConnectionEntry;
use super::error::TenantError;
use super::registry::TenantRegistry;
use crate::service::{ManagedService, ServiceContext};
use crate::traits::{ConnectionFactory, ConnectionId, TenantConnection};

/// How many times `acquire` re-resolves when the handle it obtained was
/// closed underneath it (evicted between lookup and use).
const MAX_ACQUIRE_ATTEMPTS: usize = 3;

/// Tuning for the connection cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Upper bound on one factory `open()` call.
    pub creation_timeout: Duration,
    /// Upper bound on one health-probe `ping()`.
    pub probe_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            creation_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

pub struct ConnectionCache {
    registry: Arc<TenantRegistry>,
    factory: Arc<dyn ConnectionFactory>,
    clock: Arc<dyn ClockSource>,
    config: CacheConfig,
    /// Published entries. Only ever populated with ready entries.
    entries: DashMap<TenantId, Arc<ConnectionEntry>>,
    /// Creations in progress, with their start time, for snapshots only.
    pending: DashMap<TenantId, u64>,
    creation_locks: DashMap<TenantId, Arc<Mutex<()>>>,
    closed: AtomicBool,
}

impl ConnectionCache {
    #[must_use]
    pub fn new(
        registry: Arc<TenantRegistry>,
        factory: Arc<dyn ConnectionFactory>,
        clock: Arc<dyn ClockSource>,
        config: CacheConfig,
    ) -> Self {
        Self {
            registry,
            factory,
            clock,
            config,
            entries: DashMap::new(),
            pending: DashMap::new(),
            creation_locks: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<TenantRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn factory_name(&self) -> &'static str {
        self.factory.name()
    }

    /// Number of published entries, in any state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn is_accepting(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// Re-opens the cache after [`close_all`](Self::close_all).
    pub fn reopen(&self) {
        self.closed.store(false, Ordering::Release);
    }

    /// Returns a ready handle for `tenant_id`, creating the connection if needed.
    ///
    /// The tenant's current registry status is checked on every call, so a
    /// tenant deactivated after its connection was cached is refused even
    /// though a ready entry may still exist.
    ///
    /// # Errors
    ///
    /// - [`TenantError::NotFound`] / [`TenantError::Inactive`] from the registry,
    ///   without invoking the factory
    /// - [`TenantError::ConnectionUnavailable`] if the factory failed, the
    ///   handshake exceeded the creation timeout, or the cache is shut down
    pub async fn acquire(&self, tenant_id: &str) -> Result<Arc<dyn TenantConnection>, TenantError> {
        let record = self.registry.lookup_active(tenant_id)?;
        let id = &record.tenant_id;

        for _ in 0..MAX_ACQUIRE_ATTEMPTS {
            self.ensure_accepting(id)?;

            if let Some(handle) = self.ready_handle(id) {
                if handle.is_connected() {
                    metrics::counter!("coursegate_acquire_total", "outcome" => "hit").increment(1);
                    return Ok(handle);
                }
                self.mark_degraded(id.as_str(), handle.id());
            }

            let handle = self.create(&record).await?;
            if handle.is_connected() {
                return Ok(handle);
            }
            debug!(tenant_id = %id, "fresh connection closed before use, retrying");
        }

        Err(TenantError::ConnectionUnavailable {
            tenant_id: id.to_string(),
            reason: "connection closed repeatedly during acquisition".to_string(),
        })
    }

    /// Marks the entry for `tenant_id` degraded if it still holds the
    /// connection identified by `connection_id` and is ready.
    ///
    /// Returns `false` when the entry is absent, already degraded, or has
    /// been replaced by a newer connection.
    pub fn mark_degraded(&self, tenant_id: &str, connection_id: ConnectionId) -> bool {
        let Some(entry) = self.entry(tenant_id) else {
            return false;
        };
        if entry.connection_id() != connection_id {
            return false;
        }
        let changed = entry.transition(ReadinessState::Ready, ReadinessState::Degraded);
        if changed {
            warn!(tenant_id, %connection_id, "tenant connection degraded");
            metrics::counter!("coursegate_connections_degraded_total").increment(1);
        }
        changed
    }

    /// Removes and closes the cached connection for `tenant_id`.
    ///
    /// Creations in progress are not affected. Returns whether an entry existed.
    pub async fn evict(&self, tenant_id: &str) -> bool {
        let removed = self
            .registry
            .lookup(tenant_id)
            .ok()
            .and_then(|record| self.entries.remove(&record.tenant_id))
            .or_else(|| self.entries.remove(tenant_id));
        match removed {
            Some((id, entry)) => {
                info!(tenant_id = %id, "tenant connection evicted");
                self.retire(entry).await;
                self.record_size();
                true
            }
            None => false,
        }
    }

    /// Evicts ready entries unused for at least `idle`. Returns the evicted
    /// tenants. Degraded entries and creations in progress are left alone.
    pub async fn evict_idle(&self, idle: Duration) -> Vec<TenantId> {
        #[allow(clippy::cast_possible_truncation)]
        let idle_ms = idle.as_millis() as u64;
        let now = self.clock.now();
        let is_stale = |entry: &ConnectionEntry| entry.is_ready() && entry.idle_millis(now) >= idle_ms;

        let candidates: Vec<TenantId> = self
            .entries
            .iter()
            .filter(|e| is_stale(e.value().as_ref()))
            .map(|e| e.key().clone())
            .collect();

        let mut evicted = Vec::with_capacity(candidates.len());
        for id in candidates {
            // Re-check under the shard lock: the entry may have been used or
            // replaced since the scan.
            if let Some((id, entry)) = self.entries.remove_if(&id, |_, e| is_stale(e.as_ref())) {
                debug!(tenant_id = %id, idle_ms = entry.idle_millis(now), "evicting idle connection");
                self.retire(entry).await;
                evicted.push(id);
            }
        }
        if !evicted.is_empty() {
            info!(count = evicted.len(), "idle tenant connections evicted");
            metrics::counter!("coursegate_connections_evicted_total", "reason" => "idle")
                .increment(evicted.len() as u64);
            self.record_size();
        }
        evicted
    }

    /// Pings every ready connection and marks failures degraded. Returns the
    /// number of connections that failed their probe.
    pub async fn probe(&self) -> usize {
        let ready: Vec<Arc<ConnectionEntry>> = self
            .entries
            .iter()
            .filter(|e| e.value().is_ready())
            .map(|e| Arc::clone(e.value()))
            .collect();

        let mut failed = 0;
        for entry in ready {
            let outcome = tokio::time::timeout(self.config.probe_timeout, entry.handle().ping()).await;
            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{e:#}"),
                Err(_) => format!("probe exceeded {}ms", self.config.probe_timeout.as_millis()),
            };
            warn!(tenant_id = %entry.tenant_id(), %error, "health probe failed");
            if self.mark_degraded(entry.tenant_id().as_str(), entry.connection_id()) {
                failed += 1;
            }
        }
        failed
    }

    /// Point-in-time view of every cached connection, including creations in
    /// progress (reported as `connecting`). Never waits on a creation.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ActiveConnection> {
        let mut rows: Vec<ActiveConnection> = self
            .entries
            .iter()
            .map(|e| e.value().snapshot())
            .collect();
        rows.extend(self.pending.iter().map(|p| ActiveConnection {
            tenant_id: p.key().clone(),
            state: ReadinessState::Connecting,
            last_used: *p.value(),
            created_at: *p.value(),
            connection_id: None,
        }));
        rows.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        rows
    }

    /// Stops accepting acquisitions and closes every cached connection.
    /// Returns the number of connections closed.
    pub async fn close_all(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let keys: Vec<TenantId> = self.entries.iter().map(|e| e.key().clone()).collect();
        let mut closed = 0;
        for key in keys {
            if let Some((_, entry)) = self.entries.remove(&key) {
                self.retire(entry).await;
                closed += 1;
            }
        }
        info!(closed, "connection cache closed");
        self.record_size();
        closed
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn entry(&self, tenant_id: &str) -> Option<Arc<ConnectionEntry>> {
        self.entries.get(tenant_id).map(|e| Arc::clone(e.value()))
    }

    /// Fast path: the handle of a ready entry, touching its last-used time.
    fn ready_handle(&self, id: &TenantId) -> Option<Arc<dyn TenantConnection>> {
        let entry = self.entries.get(id)?;
        if !entry.is_ready() {
            return None;
        }
        entry.touch(self.clock.now());
        Some(Arc::clone(entry.handle()))
    }

    fn ensure_accepting(&self, id: &TenantId) -> Result<(), TenantError> {
        if self.is_accepting() {
            Ok(())
        } else {
            Err(TenantError::ConnectionUnavailable {
                tenant_id: id.to_string(),
                reason: "connection cache is shut down".to_string(),
            })
        }
    }

    /// Slow path, serialized per tenant.
    async fn create(&self, record: &TenantRecord) -> Result<Arc<dyn TenantConnection>, TenantError> {
        let id = &record.tenant_id;
        let lock = Arc::clone(self.creation_locks.entry(id.clone()).or_default().value());
        let _guard = lock.lock().await;

        // Another caller may have finished while we waited.
        if let Some(handle) = self.ready_handle(id) {
            if handle.is_connected() {
                metrics::counter!("coursegate_acquire_total", "outcome" => "joined").increment(1);
                return Ok(handle);
            }
            self.mark_degraded(id.as_str(), handle.id());
        }

        // The status may have changed while we waited for the lock.
        let record = self.registry.lookup_active(id.as_str())?;
        self.ensure_accepting(id)?;

        // Release a degraded predecessor before opening its replacement;
        // some stores allow only one open handle per locator.
        if let Some((_, old)) = self.entries.remove_if(id, |_, e| !e.is_ready()) {
            debug!(tenant_id = %id, state = %old.state(), "retiring previous connection");
            self.retire(old).await;
        }

        let _pending = PendingCreation::register(&self.pending, id.clone(), self.clock.now());
        let started = Instant::now();
        let opened = tokio::time::timeout(
            self.config.creation_timeout,
            self.factory.open(&record.storage_locator),
        )
        .await;

        let handle = match opened {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                return Err(self.creation_failed(id, format!("{e:#}")));
            }
            Err(_) => {
                return Err(self.creation_failed(
                    id,
                    format!(
                        "handshake exceeded {}ms",
                        self.config.creation_timeout.as_millis()
                    ),
                ));
            }
        };

        if !handle.is_connected() {
            close_quietly(id, handle.as_ref()).await;
            return Err(self.creation_failed(id, "handshake did not complete".to_string()));
        }

        let entry = Arc::new(ConnectionEntry::ready(
            id.clone(),
            Arc::clone(&handle),
            self.clock.now(),
        ));
        if let Some(old) = self.entries.insert(id.clone(), entry) {
            self.retire(old).await;
        }

        // close_all may have drained the map while we were connecting.
        if !self.is_accepting() {
            if let Some((_, entry)) = self.entries.remove(id) {
                self.retire(entry).await;
            }
            return Err(TenantError::ConnectionUnavailable {
                tenant_id: id.to_string(),
                reason: "connection cache is shut down".to_string(),
            });
        }

        #[allow(clippy::cast_possible_truncation)]
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            tenant_id = %id,
            connection_id = %handle.id(),
            backend = self.factory.name(),
            elapsed_ms,
            "tenant connection established"
        );
        metrics::counter!("coursegate_acquire_total", "outcome" => "created").increment(1);
        self.record_size();
        Ok(handle)
    }

    fn creation_failed(&self, id: &TenantId, reason: String) -> TenantError {
        warn!(tenant_id = %id, backend = self.factory.name(), %reason, "tenant connection failed");
        metrics::counter!("coursegate_acquire_total", "outcome" => "failed").increment(1);
        TenantError::ConnectionUnavailable {
            tenant_id: id.to_string(),
            reason,
        }
    }

    async fn retire(&self, entry: Arc<ConnectionEntry>) {
        entry.mark_closed();
        close_quietly(entry.tenant_id(), entry.handle().as_ref()).await;
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_size(&self) {
        metrics::gauge!("coursegate_cached_connections").set(self.entries.len() as f64);
    }
}

async fn close_quietly(id: &TenantId, handle: &dyn TenantConnection) {
    if let Err(e) = handle.close().await {
        warn!(tenant_id = %id, connection_id = %handle.id(), error = %e, "closing connection failed");
    }
}

/// Tracks a creation in progress; removed on drop so a failed, timed-out, or
/// cancelled creation reverts to "absent".
struct PendingCreation<'a> {
    pending: &'a DashMap<TenantId, u64>,
    id: TenantId,
}

impl<'a> PendingCreation<'a> {
    fn register(pending: &'a DashMap<TenantId, u64>, id: TenantId, now: u64) -> Self {
        pending.insert(id.clone(), now);
        Self { pending, id }
    }
}

impl Drop for PendingCreation<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

#[async_trait]
impl ManagedService for ConnectionCache {
    fn name(&self) -> &'static str {
        "connection-cache"
    }

    async fn init(&self, _ctx: &ServiceContext) -> anyhow::Result<()> {
        self.reopen();
        info!(backend = self.factory.name(), "connection cache ready");
        Ok(())
    }

    async fn shutdown(&self, _terminate: bool) -> anyhow::Result<()> {
        self.close_all().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use coursegate_core::TenantStatus;
    use tokio::task::JoinSet;

    use super::*;
    use crate::tenancy::testing::{fixture, Fixture};

    fn config() -> CacheConfig {
        CacheConfig {
            creation_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_acquires_invoke_factory_once() {
        let Fixture { cache, factory, .. } = fixture(&["ngo"], config()).await;
        factory.delay("tenant_ngo", Duration::from_millis(50));

        let mut set = JoinSet::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            set.spawn(async move { cache.acquire("ngo").await.map(|h| h.id()) });
        }
        let mut ids = Vec::new();
        while let Some(result) = set.join_next().await {
            ids.push(result.unwrap().unwrap());
        }

        assert_eq!(factory.opens(), 1);
        assert_eq!(ids.len(), 16);
        assert!(ids.iter().all(|id| *id == ids[0]));
    }

    #[tokio::test]
    async fn two_simultaneous_acquires_share_one_entry() {
        let Fixture { cache, factory, .. } = fixture(&["ngo"], config()).await;
        factory.delay("tenant_ngo", Duration::from_millis(20));

        let (a, b) = tokio::join!(cache.acquire("ngo"), cache.acquire("ngo"));
        assert_eq!(a.unwrap().id(), b.unwrap().id());

        let rows = cache.snapshot();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tenant_id.as_str(), "ngo");
        assert_eq!(rows[0].state, ReadinessState::Ready);
    }

    #[tokio::test]
    async fn failed_creation_is_not_cached() {
        let Fixture { cache, factory, .. } = fixture(&["ngo"], config()).await;
        factory.fail_next(1);

        let err = cache.acquire("ngo").await.unwrap_err();
        assert!(matches!(err, TenantError::ConnectionUnavailable { .. }));
        assert!(cache.snapshot().is_empty());

        let handle = cache.acquire("ngo").await.unwrap();
        assert!(handle.is_connected());
        assert_eq!(factory.opens(), 2);
    }

    #[tokio::test]
    async fn tenants_get_distinct_connections() {
        let Fixture { cache, .. } = fixture(&["tenant-a", "tenant-b"], config()).await;
        let a = cache.acquire("tenant-a").await.unwrap();
        let b = cache.acquire("tenant-b").await.unwrap();
        assert_ne!(a.id(), b.id());
        assert_ne!(a.locator(), b.locator());
    }

    #[tokio::test]
    async fn slow_creation_does_not_block_other_tenants() {
        let Fixture { cache, factory, .. } = fixture(&["slow", "fast"], config()).await;
        factory.delay("tenant_slow", Duration::from_secs(2));

        let slow = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.acquire("slow").await.map(|h| h.id()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let fast = tokio::time::timeout(Duration::from_millis(500), cache.acquire("fast"))
            .await
            .expect("fast tenant must not wait for slow tenant");
        assert!(fast.is_ok());
        assert!(!slow.is_finished());
        slow.abort();
    }

    #[tokio::test]
    async fn degraded_entry_is_replaced_by_one_new_connection() {
        let Fixture { cache, factory, .. } = fixture(&["ngo"], config()).await;
        let first = cache.acquire("ngo").await.unwrap();

        assert!(cache.mark_degraded("ngo", first.id()));
        assert_eq!(cache.snapshot()[0].state, ReadinessState::Degraded);

        let second = cache.acquire("ngo").await.unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(factory.opens(), 2);
        assert!(!first.is_connected(), "replaced handle is closed");

        let rows = cache.snapshot();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].state, ReadinessState::Ready);
        assert_eq!(rows[0].connection_id, Some(second.id().0));
    }

    #[tokio::test]
    async fn stale_degradation_report_does_not_clobber_replacement() {
        let Fixture { cache, .. } = fixture(&["ngo"], config()).await;
        let first = cache.acquire("ngo").await.unwrap();
        cache.mark_degraded("ngo", first.id());
        let second = cache.acquire("ngo").await.unwrap();

        assert!(!cache.mark_degraded("ngo", first.id()));
        assert_eq!(cache.snapshot()[0].state, ReadinessState::Ready);
        assert!(cache.mark_degraded("ngo", second.id()));
        assert!(!cache.mark_degraded("ngo", second.id()));
    }

    #[tokio::test(start_paused = true)]
    async fn creation_timeout_reverts_to_absent() {
        let Fixture { cache, factory, .. } = fixture(
            &["ngo"],
            CacheConfig {
                creation_timeout: Duration::from_millis(100),
                ..config()
            },
        )
        .await;
        factory.delay("tenant_ngo", Duration::from_secs(60));

        let err = cache.acquire("ngo").await.unwrap_err();
        match err {
            TenantError::ConnectionUnavailable { reason, .. } => {
                assert!(reason.contains("100ms"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(cache.snapshot().is_empty());

        factory.clear_delay("tenant_ngo");
        assert!(cache.acquire("ngo").await.is_ok());
        assert_eq!(factory.opens(), 2);
    }

    #[tokio::test]
    async fn unknown_tenant_never_reaches_factory() {
        let Fixture { cache, factory, .. } = fixture(&["ngo"], config()).await;
        let err = cache.acquire("unknown-tenant").await.unwrap_err();
        assert!(matches!(err, TenantError::NotFound { .. }));
        assert_eq!(factory.opens(), 0);
    }

    #[tokio::test]
    async fn inactive_tenant_is_refused_despite_cached_entry() {
        let Fixture {
            cache, registry, ..
        } = fixture(&["ngo"], config()).await;
        cache.acquire("ngo").await.unwrap();
        registry.set_status("ngo", TenantStatus::Inactive).await.unwrap();

        let err = cache.acquire("ngo").await.unwrap_err();
        assert!(matches!(
            err,
            TenantError::Inactive { status: TenantStatus::Inactive, .. }
        ));
    }

    #[tokio::test]
    async fn snapshot_reports_creation_in_progress() {
        let Fixture { cache, factory, .. } = fixture(&["ngo"], config()).await;
        factory.delay("tenant_ngo", Duration::from_millis(300));

        let task = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.acquire("ngo").await.map(|h| h.id()) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let rows = cache.snapshot();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].state, ReadinessState::Connecting);
        assert!(rows[0].connection_id.is_none());

        task.await.unwrap().unwrap();
        assert_eq!(cache.snapshot()[0].state, ReadinessState::Ready);
    }

    #[tokio::test]
    async fn idle_entries_are_evicted_and_closed() {
        let Fixture { cache, clock, .. } = fixture(&["a", "b"], config()).await;
        let a = cache.acquire("a").await.unwrap();
        cache.acquire("b").await.unwrap();

        clock.advance(Duration::from_secs(600));
        cache.acquire("b").await.unwrap();

        let evicted = cache.evict_idle(Duration::from_secs(300)).await;
        assert_eq!(evicted, vec![TenantId::new("a")]);
        assert!(!a.is_connected());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn idle_eviction_skips_degraded_entries() {
        let Fixture { cache, clock, .. } = fixture(&["a"], config()).await;
        let a = cache.acquire("a").await.unwrap();
        cache.mark_degraded("a", a.id());
        clock.advance(Duration::from_secs(600));
        assert!(cache.evict_idle(Duration::from_secs(1)).await.is_empty());
    }

    #[tokio::test]
    async fn probe_degrades_unreachable_connections() {
        let Fixture { cache, factory, .. } = fixture(&["a", "b"], config()).await;
        let a = cache.acquire("a").await.unwrap();
        cache.acquire("b").await.unwrap();

        factory.memory.set_available("tenant_a", false);
        assert_eq!(cache.probe().await, 1);
        let rows = cache.snapshot();
        assert_eq!(rows[0].state, ReadinessState::Degraded);
        assert_eq!(rows[1].state, ReadinessState::Ready);

        factory.memory.set_available("tenant_a", true);
        let replacement = cache.acquire("a").await.unwrap();
        assert_ne!(replacement.id(), a.id());
    }

    #[tokio::test]
    async fn closed_handle_on_fast_path_triggers_recreation() {
        let Fixture { cache, factory, .. } = fixture(&["ngo"], config()).await;
        let first = cache.acquire("ngo").await.unwrap();
        first.close().await.unwrap();

        let second = cache.acquire("ngo").await.unwrap();
        assert!(second.is_connected());
        assert_ne!(first.id(), second.id());
        assert_eq!(factory.opens(), 2);
    }

    #[tokio::test]
    async fn evict_removes_entry_and_closes_handle() {
        let Fixture { cache, .. } = fixture(&["ngo"], config()).await;
        let handle = cache.acquire("ngo").await.unwrap();
        assert!(cache.evict("ngo").await);
        assert!(!handle.is_connected());
        assert!(!cache.evict("ngo").await);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn close_all_refuses_further_acquires() {
        let Fixture { cache, .. } = fixture(&["a", "b"], config()).await;
        let a = cache.acquire("a").await.unwrap();
        cache.acquire("b").await.unwrap();

        assert_eq!(cache.close_all().await, 2);
        assert!(!a.is_connected());
        let err = cache.acquire("a").await.unwrap_err();
        assert!(matches!(err, TenantError::ConnectionUnavailable { .. }));

        cache.reopen();
        assert!(cache.acquire("a").await.is_ok());
    }
}
