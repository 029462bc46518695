//! Background maintenance of the connection cache: idle eviction and health
//! probing, on a fixed cadence and on demand.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info};

use super::cache::ConnectionCache;
use crate::service::{BackgroundRunnable, BackgroundWorker, ManagedService, ServiceContext};

/// On-demand maintenance requests. The optional reply receives the number of
/// connections evicted (`Sweep`) or newly degraded (`Probe`).
#[derive(Debug)]
pub enum MaintenanceTask {
    Sweep { reply: Option<oneshot::Sender<usize>> },
    Probe { reply: Option<oneshot::Sender<usize>> },
}

struct Maintenance {
    cache: Arc<ConnectionCache>,
    idle_timeout: Option<Duration>,
}

impl Maintenance {
    async fn sweep(&self) -> usize {
        match self.idle_timeout {
            Some(idle) => self.cache.evict_idle(idle).await.len(),
            None => 0,
        }
    }
}

#[async_trait]
impl BackgroundRunnable for Maintenance {
    type Task = MaintenanceTask;

    fn name(&self) -> &'static str {
        "connection-reaper"
    }

    async fn run(&mut self, task: MaintenanceTask) {
        match task {
            MaintenanceTask::Sweep { reply } => {
                let evicted = self.sweep().await;
                if let Some(reply) = reply {
                    let _ = reply.send(evicted);
                }
            }
            MaintenanceTask::Probe { reply } => {
                let degraded = self.cache.probe().await;
                if let Some(reply) = reply {
                    let _ = reply.send(degraded);
                }
            }
        }
    }

    async fn on_tick(&mut self) {
        let evicted = self.sweep().await;
        let degraded = self.cache.probe().await;
        if evicted > 0 || degraded > 0 {
            debug!(evicted, degraded, "maintenance pass finished");
        }
    }
}

/// Lifecycle wrapper that owns the maintenance worker.
pub struct IdleReaper {
    cache: Arc<ConnectionCache>,
    worker: Mutex<Option<BackgroundWorker<Maintenance>>>,
}

impl IdleReaper {
    #[must_use]
    pub fn new(cache: Arc<ConnectionCache>) -> Self {
        Self {
            cache,
            worker: Mutex::new(None),
        }
    }

    /// Evicts idle connections now. Returns how many were evicted.
    ///
    /// # Errors
    ///
    /// Returns an error if the reaper is not running.
    pub async fn sweep(&self) -> anyhow::Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.submit(MaintenanceTask::Sweep { reply: Some(tx) }).await?;
        Ok(rx.await?)
    }

    /// Probes ready connections now. Returns how many were marked degraded.
    ///
    /// # Errors
    ///
    /// Returns an error if the reaper is not running.
    pub async fn probe(&self) -> anyhow::Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.submit(MaintenanceTask::Probe { reply: Some(tx) }).await?;
        Ok(rx.await?)
    }

    /// Queues a maintenance task.
    ///
    /// # Errors
    ///
    /// Returns an error if the reaper is not running.
    pub async fn submit(&self, task: MaintenanceTask) -> anyhow::Result<()> {
        match self.worker.lock().await.as_ref() {
            Some(worker) => worker.submit(task).await,
            None => Err(anyhow::anyhow!("connection reaper not running")),
        }
    }
}

#[async_trait]
impl ManagedService for IdleReaper {
    fn name(&self) -> &'static str {
        "connection-reaper"
    }

    async fn init(&self, ctx: &ServiceContext) -> anyhow::Result<()> {
        let mut slot = self.worker.lock().await;
        if slot.is_some() {
            return Ok(());
        }
        let idle_timeout = ctx.config.idle_timeout();
        let interval = ctx.config.reaper_interval();
        anyhow::ensure!(!interval.is_zero(), "reaper interval must be positive");

        let runnable = Maintenance {
            cache: Arc::clone(&self.cache),
            idle_timeout,
        };
        *slot = Some(BackgroundWorker::start(runnable, interval));
        #[allow(clippy::cast_possible_truncation)]
        let idle_timeout_ms = idle_timeout.map_or(0, |d| d.as_millis() as u64);
        info!(
            interval_ms = ctx.config.reaper_interval_ms,
            idle_timeout_ms, "connection reaper started"
        );
        Ok(())
    }

    async fn shutdown(&self, _terminate: bool) -> anyhow::Result<()> {
        if let Some(mut worker) = self.worker.lock().await.take() {
            worker.stop().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use coursegate_core::{ReadinessState, TenantId};

    use super::*;
    use crate::service::TenancyConfig;
    use crate::tenancy::testing::fixture;
    use crate::tenancy::CacheConfig;

    fn ctx(idle_timeout_ms: u64, reaper_interval_ms: u64) -> ServiceContext {
        ServiceContext {
            config: Arc::new(TenancyConfig {
                idle_timeout_ms,
                reaper_interval_ms,
                ..TenancyConfig::default()
            }),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn tick_evicts_idle_connections() {
        let fx = fixture(&["a", "b"], CacheConfig::default()).await;
        fx.cache.acquire("a").await.unwrap();
        fx.clock.advance(Duration::from_secs(600));
        fx.cache.acquire("b").await.unwrap();

        let reaper = IdleReaper::new(fx.cache.clone());
        reaper.init(&ctx(300_000, 1_000)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        let remaining: Vec<TenantId> = fx.cache.snapshot().into_iter().map(|c| c.tenant_id).collect();
        assert_eq!(remaining, vec![TenantId::new("b")]);
        reaper.shutdown(false).await.unwrap();
    }

    #[tokio::test]
    async fn on_demand_sweep_and_probe_report_counts() {
        let fx = fixture(&["a", "b"], CacheConfig::default()).await;
        fx.cache.acquire("a").await.unwrap();
        fx.cache.acquire("b").await.unwrap();

        let reaper = IdleReaper::new(fx.cache.clone());
        reaper.init(&ctx(60_000, 3_600_000)).await.unwrap();

        fx.factory.memory.set_available("tenant_b", false);
        assert_eq!(reaper.probe().await.unwrap(), 1);
        assert_eq!(fx.cache.snapshot()[1].state, ReadinessState::Degraded);

        fx.clock.advance(Duration::from_secs(120));
        // Degraded entries are not idle-evicted; only `a` goes.
        assert_eq!(reaper.sweep().await.unwrap(), 1);
        assert_eq!(fx.cache.len(), 1);

        reaper.shutdown(false).await.unwrap();
    }

    #[tokio::test]
    async fn disabled_idle_timeout_keeps_connections() {
        let fx = fixture(&["a"], CacheConfig::default()).await;
        fx.cache.acquire("a").await.unwrap();
        fx.clock.advance(Duration::from_secs(86_400));

        let reaper = IdleReaper::new(fx.cache.clone());
        reaper.init(&ctx(0, 3_600_000)).await.unwrap();
        assert_eq!(reaper.sweep().await.unwrap(), 0);
        reaper.shutdown(false).await.unwrap();
    }

    #[tokio::test]
    async fn requests_fail_once_stopped() {
        let fx = fixture(&[], CacheConfig::default()).await;
        let reaper = IdleReaper::new(fx.cache.clone());
        assert!(reaper.sweep().await.is_err());

        reaper.init(&ctx(60_000, 1_000)).await.unwrap();
        reaper.shutdown(false).await.unwrap();
        assert!(reaper.probe().await.is_err());
    }
}
