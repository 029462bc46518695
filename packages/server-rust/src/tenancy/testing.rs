//! Test doubles shared by the tenancy and network test modules.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coursegate_core::messages::CreateTenantRequest;
use coursegate_core::ManualClock;
use dashmap::DashMap;

use super::cache::{CacheConfig, ConnectionCache};
use super::registry::TenantRegistry;
use crate::storage::{MemoryConnectionFactory, MemoryTenantStore};
use crate::traits::{ConnectionFactory, TenantConnection};

/// Memory-backed factory that counts invocations and can be told to fail
/// or stall per locator.
#[derive(Default)]
pub(crate) struct ScriptedFactory {
    pub(crate) memory: MemoryConnectionFactory,
    opens: AtomicUsize,
    failures: AtomicUsize,
    delays: DashMap<String, Duration>,
}

impl ScriptedFactory {
    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Makes the next `n` opens fail after any configured delay.
    pub(crate) fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub(crate) fn delay(&self, locator: &str, delay: Duration) {
        self.delays.insert(locator.to_string(), delay);
    }

    pub(crate) fn clear_delay(&self, locator: &str) {
        self.delays.remove(locator);
    }
}

#[async_trait]
impl ConnectionFactory for ScriptedFactory {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn open(&self, locator: &str) -> anyhow::Result<Arc<dyn TenantConnection>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let delay = self.delays.get(locator).map(|d| *d.value());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            anyhow::bail!("scripted failure opening {locator}");
        }
        self.memory.open(locator).await
    }
}

pub(crate) struct Fixture {
    pub(crate) cache: Arc<ConnectionCache>,
    pub(crate) registry: Arc<TenantRegistry>,
    pub(crate) factory: Arc<ScriptedFactory>,
    pub(crate) clock: Arc<ManualClock>,
}

/// Builds a cache over a registry holding `tenants` (all active). Each
/// tenant's locator is `tenant_<id>`.
pub(crate) async fn fixture(tenants: &[&str], config: CacheConfig) -> Fixture {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let registry = Arc::new(
        TenantRegistry::load(Arc::new(MemoryTenantStore::new()), clock.clone(), "tenant_")
            .await
            .unwrap(),
    );
    for tenant in tenants {
        registry
            .create(CreateTenantRequest {
                tenant_id: Some((*tenant).to_string()),
                display_name: format!("{tenant} org"),
                ..CreateTenantRequest::default()
            })
            .await
            .unwrap();
    }
    let factory = Arc::new(ScriptedFactory::default());
    let cache = Arc::new(ConnectionCache::new(
        registry.clone(),
        factory.clone(),
        clock.clone(),
        config,
    ));
    Fixture {
        cache,
        registry,
        factory,
        clock,
    }
}
