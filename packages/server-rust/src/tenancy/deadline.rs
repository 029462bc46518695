//! Bounded-time execution of storage operations.
//!
//! A deadline unblocks the *caller*; it does not guarantee the operation
//! stops. [`QueryDeadline::run`] drops the operation future on expiry, which
//! cancels drivers whose I/O is driven by that future. [`QueryDeadline::run_detached`]
//! moves the operation onto its own task and abandons it on expiry, so the
//! store may still complete the work after the caller received `QueryTimeout`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use coursegate_core::{RequestContext, TenantId};
use tracing::warn;

use super::cache::ConnectionCache;
use super::error::TenantError;
use crate::traits::TenantConnection;

/// Per-operation deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryDeadline {
    timeout: Duration,
}

impl QueryDeadline {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[allow(clippy::cast_possible_truncation)]
    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    /// Runs `op` to completion or until the deadline, whichever comes first.
    /// On expiry the operation future is dropped.
    ///
    /// # Errors
    ///
    /// [`TenantError::QueryTimeout`] on expiry, otherwise the operation's own
    /// error converted into a [`TenantError`].
    pub async fn run<T, E, F>(&self, op: F) -> Result<T, TenantError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<TenantError>,
    {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(result) => result.map_err(Into::into),
            Err(_elapsed) => Err(self.expired()),
        }
    }

    /// Runs `op` on a separate task. On expiry the caller gets
    /// `QueryTimeout` while the task is left running to completion.
    ///
    /// # Errors
    ///
    /// [`TenantError::QueryTimeout`] on expiry; [`TenantError::Storage`] if
    /// the operation panicked; otherwise the operation's own error.
    pub async fn run_detached<T, E, F>(&self, op: F) -> Result<T, TenantError>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<TenantError> + Send + 'static,
    {
        let task = tokio::spawn(op);
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result.map_err(Into::into),
            Ok(Err(join)) => Err(TenantError::Storage(anyhow::anyhow!(
                "storage operation aborted: {join}"
            ))),
            Err(_elapsed) => Err(self.expired()),
        }
    }

    fn expired(&self) -> TenantError {
        metrics::counter!("coursegate_query_timeouts_total").increment(1);
        TenantError::QueryTimeout {
            timeout_ms: self.timeout_ms(),
        }
    }
}

impl Default for QueryDeadline {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

/// What a domain handler receives for a resolved request: its context, the
/// tenant's ready handle, and the means to run bounded operations on it.
///
/// Built per request by the resolution middleware and dropped with the
/// request. The handle is shared with the cache; holding a scope never keeps
/// an evicted entry in the cache.
#[derive(Clone)]
pub struct TenantScope {
    ctx: RequestContext,
    connection: Arc<dyn TenantConnection>,
    cache: Arc<ConnectionCache>,
    deadline: QueryDeadline,
}

impl TenantScope {
    #[must_use]
    pub fn new(
        ctx: RequestContext,
        connection: Arc<dyn TenantConnection>,
        cache: Arc<ConnectionCache>,
        deadline: QueryDeadline,
    ) -> Self {
        Self {
            ctx,
            connection,
            cache,
            deadline,
        }
    }

    #[must_use]
    pub fn tenant_id(&self) -> &TenantId {
        &self.ctx.tenant_id
    }

    #[must_use]
    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    #[must_use]
    pub fn connection(&self) -> &Arc<dyn TenantConnection> {
        &self.connection
    }

    #[must_use]
    pub fn deadline(&self) -> QueryDeadline {
        self.deadline
    }

    /// Runs `op` against this request's connection under the request deadline.
    ///
    /// A storage failure on a handle that now reports itself disconnected
    /// marks the cache entry degraded, so the next request for the tenant
    /// gets a fresh connection.
    ///
    /// # Errors
    ///
    /// See [`QueryDeadline::run`].
    pub async fn bounded<T, F, Fut>(&self, op: F) -> Result<T, TenantError>
    where
        F: FnOnce(Arc<dyn TenantConnection>) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let result = self.deadline.run(op(Arc::clone(&self.connection))).await;
        if let Err(TenantError::Storage(e)) = &result {
            if !self.connection.is_connected() {
                warn!(
                    tenant_id = %self.ctx.tenant_id,
                    request_id = %self.ctx.request_id,
                    error = %e,
                    "storage operation failed on a dead connection"
                );
                self.cache
                    .mark_degraded(self.ctx.tenant_id.as_str(), self.connection.id());
            }
        }
        result
    }
}

impl std::fmt::Debug for TenantScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantScope")
            .field("ctx", &self.ctx)
            .field("connection", &self.connection.id())
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use coursegate_core::ReadinessState;
    use serde_json::json;

    use super::*;
    use crate::tenancy::testing::{fixture, Fixture};
    use crate::tenancy::CacheConfig;

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_operation_times_out_within_deadline() {
        let deadline = QueryDeadline::new(Duration::from_millis(250));
        let started = tokio::time::Instant::now();

        let result: Result<(), TenantError> = deadline
            .run(std::future::pending::<anyhow::Result<()>>())
            .await;

        assert!(matches!(result, Err(TenantError::QueryTimeout { timeout_ms: 250 })));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(250));
        assert!(elapsed < Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn run_drops_operation_on_expiry() {
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(dropped.clone());
        let op = async move {
            let _flag = flag;
            std::future::pending::<()>().await;
            Ok::<_, TenantError>(())
        };

        let result = QueryDeadline::new(Duration::from_millis(10)).run(op).await;
        assert!(result.is_err());
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn run_detached_leaves_operation_running() {
        let finished = Arc::new(AtomicBool::new(false));
        let op = {
            let finished = finished.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                finished.store(true, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(())
            }
        };

        let result = QueryDeadline::new(Duration::from_millis(50))
            .run_detached(op)
            .await;
        assert!(matches!(result, Err(TenantError::QueryTimeout { timeout_ms: 50 })));
        assert!(!finished.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn operation_errors_pass_through_as_storage_errors() {
        let result: Result<(), _> = QueryDeadline::default()
            .run(async { Err::<(), _>(anyhow::anyhow!("disk full")) })
            .await;
        assert!(matches!(result, Err(TenantError::Storage(_))));
    }

    async fn scope(fixture: &Fixture) -> TenantScope {
        let connection = fixture.cache.acquire("ngo").await.unwrap();
        TenantScope::new(
            RequestContext::new(TenantId::new("ngo"), "req-1"),
            connection,
            fixture.cache.clone(),
            QueryDeadline::new(Duration::from_secs(1)),
        )
    }

    #[tokio::test]
    async fn bounded_operations_use_the_request_connection() {
        let fixture = fixture(&["ngo"], CacheConfig::default()).await;
        let scope = scope(&fixture).await;

        scope
            .bounded(|conn| async move {
                conn.store("courses", "c1", &json!({"title": "Intro"})).await
            })
            .await
            .unwrap();
        let doc = scope
            .bounded(|conn| async move { conn.load("courses", "c1").await })
            .await
            .unwrap();
        assert_eq!(doc, Some(json!({"title": "Intro"})));
    }

    #[tokio::test]
    async fn failure_on_dead_connection_degrades_entry() {
        let fixture = fixture(&["ngo"], CacheConfig::default()).await;
        let scope = scope(&fixture).await;
        fixture.factory.memory.set_available("tenant_ngo", false);

        let err = scope
            .bounded(|conn| async move { conn.load_all("courses").await })
            .await
            .unwrap_err();
        assert!(matches!(err, TenantError::Storage(_)));
        assert_eq!(fixture.cache.snapshot()[0].state, ReadinessState::Degraded);
    }
}
