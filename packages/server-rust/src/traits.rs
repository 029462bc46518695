use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use coursegate_core::TenantRecord;
use serde_json::Value;

/// Process-unique identity of one opened tenant connection.
///
/// Two handles compare equal only if they came from the same `open()` call,
/// which is how concurrent acquirers verify they share one connection and how
/// `mark_degraded` avoids clobbering a newer replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Allocates the next identifier. Identifiers start at 1.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Live session to one tenant's isolated store.
///
/// Published handles are shared read-concurrently by every request for the
/// tenant, so implementations must support concurrent operations (a pooled
/// driver satisfies this). Documents are JSON values grouped by collection
/// (`"courses"`, `"modules"`, `"assignments"`, ...).
#[async_trait]
pub trait TenantConnection: Send + Sync + fmt::Debug {
    /// Identity assigned when the connection was opened.
    fn id(&self) -> ConnectionId;

    /// Storage locator this connection was opened against.
    fn locator(&self) -> &str;

    /// Mirrors the transport's connected state. Non-blocking.
    fn is_connected(&self) -> bool;

    /// Round-trips to the store to verify the handle is still usable.
    async fn ping(&self) -> anyhow::Result<()>;

    /// Load a single document by collection and key.
    async fn load(&self, collection: &str, key: &str) -> anyhow::Result<Option<Value>>;

    /// Load every document in a collection, ordered by key.
    async fn load_all(&self, collection: &str) -> anyhow::Result<Vec<(String, Value)>>;

    /// Insert or replace a document.
    async fn store(&self, collection: &str, key: &str, value: &Value) -> anyhow::Result<()>;

    /// Delete a document. Returns whether it existed.
    async fn delete(&self, collection: &str, key: &str) -> anyhow::Result<bool>;

    /// Release the underlying session. Later operations fail and
    /// `is_connected()` reports `false`.
    async fn close(&self) -> anyhow::Result<()>;
}

/// Opens connections to tenant stores.
///
/// Stateless: no caching and no internal retries. Retry and reuse policy
/// belong to the connection cache. `open` returns only after the handshake
/// completed, so a returned handle is ready for use.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Short backend name used in logs (`"memory"`, `"redb"`, `"postgres"`).
    fn name(&self) -> &'static str;

    /// Open a new connection to the store identified by `locator`.
    async fn open(&self, locator: &str) -> anyhow::Result<Arc<dyn TenantConnection>>;
}

/// Persistence for the tenant registry's records.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Load every persisted tenant record.
    async fn load_all(&self) -> anyhow::Result<Vec<TenantRecord>>;

    /// Insert or replace a tenant record.
    async fn store(&self, record: &TenantRecord) -> anyhow::Result<()>;
}
