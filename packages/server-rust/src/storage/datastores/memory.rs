//! In-process storage backend.
//!
//! [`MemoryConnectionFactory`] plays the role of a database server: it holds
//! one [`MemoryDatabase`] per storage locator so data survives reconnects to
//! the same locator, while each `open()` still yields a fresh connection with
//! its own identity. Databases can be marked unavailable to simulate an outage.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coursegate_core::{TenantId, TenantRecord};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;

use crate::storage::validate_locator;
use crate::traits::{ConnectionFactory, ConnectionId, TenantConnection, TenantStore};

/// Documents of one tenant store, grouped by collection.
#[derive(Debug)]
pub struct MemoryDatabase {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
    available: AtomicBool,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }
}

/// Factory for [`MemoryConnection`]s.
#[derive(Debug, Default)]
pub struct MemoryConnectionFactory {
    databases: DashMap<String, Arc<MemoryDatabase>>,
    handshake_delay: Duration,
}

impl MemoryConnectionFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every `open()` by `delay`, emulating a network handshake.
    #[must_use]
    pub fn with_handshake_delay(mut self, delay: Duration) -> Self {
        self.handshake_delay = delay;
        self
    }

    /// Marks the store behind `locator` as reachable or not. While
    /// unavailable, `open()` fails and existing connections report
    /// themselves disconnected.
    pub fn set_available(&self, locator: &str, available: bool) {
        self.database(locator)
            .available
            .store(available, Ordering::SeqCst);
    }

    /// Number of distinct stores that have ever been opened.
    #[must_use]
    pub fn database_count(&self) -> usize {
        self.databases.len()
    }

    fn database(&self, locator: &str) -> Arc<MemoryDatabase> {
        self.databases
            .entry(locator.to_string())
            .or_default()
            .value()
            .clone()
    }
}

#[async_trait]
impl ConnectionFactory for MemoryConnectionFactory {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn open(&self, locator: &str) -> anyhow::Result<Arc<dyn TenantConnection>> {
        validate_locator(locator)?;
        if !self.handshake_delay.is_zero() {
            tokio::time::sleep(self.handshake_delay).await;
        }
        let db = self.database(locator);
        if !db.available.load(Ordering::SeqCst) {
            anyhow::bail!("store {locator} is unavailable");
        }
        Ok(Arc::new(MemoryConnection {
            id: ConnectionId::next(),
            locator: locator.to_string(),
            db,
            open: AtomicBool::new(true),
        }))
    }
}

/// Connection to one [`MemoryDatabase`].
#[derive(Debug)]
pub struct MemoryConnection {
    id: ConnectionId,
    locator: String,
    db: Arc<MemoryDatabase>,
    open: AtomicBool,
}

impl MemoryConnection {
    fn check(&self) -> anyhow::Result<()> {
        if !self.open.load(Ordering::SeqCst) {
            anyhow::bail!("connection {} to {} is closed", self.id, self.locator);
        }
        if !self.db.available.load(Ordering::SeqCst) {
            anyhow::bail!("store {} is unavailable", self.locator);
        }
        Ok(())
    }
}

#[async_trait]
impl TenantConnection for MemoryConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn locator(&self) -> &str {
        &self.locator
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::SeqCst) && self.db.available.load(Ordering::SeqCst)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        self.check()
    }

    async fn load(&self, collection: &str, key: &str) -> anyhow::Result<Option<Value>> {
        self.check()?;
        let collections = self.db.collections.read();
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(key))
            .cloned())
    }

    async fn load_all(&self, collection: &str) -> anyhow::Result<Vec<(String, Value)>> {
        self.check()?;
        let collections = self.db.collections.read();
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn store(&self, collection: &str, key: &str, value: &Value) -> anyhow::Result<()> {
        self.check()?;
        self.db
            .collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> anyhow::Result<bool> {
        self.check()?;
        Ok(self
            .db
            .collections
            .write()
            .get_mut(collection)
            .is_some_and(|docs| docs.remove(key).is_some()))
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Registry catalog kept in memory. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryTenantStore {
    records: RwLock<BTreeMap<TenantId, TenantRecord>>,
}

impl MemoryTenantStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with records, e.g. from a bootstrap file.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = TenantRecord>) -> Self {
        let store = Self::default();
        {
            let mut guard = store.records.write();
            for record in records {
                guard.insert(record.tenant_id.clone(), record);
            }
        }
        store
    }
}

#[async_trait]
impl TenantStore for MemoryTenantStore {
    async fn load_all(&self) -> anyhow::Result<Vec<TenantRecord>> {
        Ok(self.records.read().values().cloned().collect())
    }

    async fn store(&self, record: &TenantRecord) -> anyhow::Result<()> {
        self.records
            .write()
            .insert(record.tenant_id.clone(), record.clone());
        Ok(())
    }
}
