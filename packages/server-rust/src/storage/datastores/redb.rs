//! Embedded storage backend: one redb database file per tenant.
//!
//! Each tenant's store lives at `<data_dir>/<locator>.redb`, with one table
//! per collection holding JSON-serialized documents. redb is synchronous, so
//! every call runs on the blocking thread pool. A database file can only be
//! opened once per process; the connection cache closes a degraded handle
//! before the replacement is opened.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coursegate_core::TenantRecord;
use parking_lot::RwLock;
use redb::{
    CommitError, Database, ReadableTable, StorageError, TableDefinition, TableError,
    TransactionError,
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::storage::validate_locator;
use crate::traits::{ConnectionFactory, ConnectionId, TenantConnection, TenantStore};

/// Registry catalog table, keyed by tenant identifier.
const TENANTS: TableDefinition<&str, &[u8]> = TableDefinition::new("tenants");

/// Runs a blocking redb closure on the blocking pool.
async fn blocking<T, F>(f: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

/// Whether `error` is an I/O failure of the underlying file, as opposed to a
/// missing table or a malformed document.
fn is_io_failure(error: &anyhow::Error) -> bool {
    let io = |e: &StorageError| matches!(e, StorageError::Io(_));
    error.downcast_ref::<StorageError>().is_some_and(io)
        || matches!(error.downcast_ref::<TransactionError>(), Some(TransactionError::Storage(e)) if io(e))
        || matches!(error.downcast_ref::<TableError>(), Some(TableError::Storage(e)) if io(e))
        || matches!(error.downcast_ref::<CommitError>(), Some(CommitError::Storage(e)) if io(e))
}

/// Opens `<data_dir>/<locator>.redb`, creating it if absent.
#[derive(Debug, Clone)]
pub struct RedbConnectionFactory {
    data_dir: PathBuf,
    open_timeout: Duration,
}

impl RedbConnectionFactory {
    /// Creates a factory rooted at `data_dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(data_dir: impl Into<PathBuf>, open_timeout: Duration) -> anyhow::Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self {
            data_dir,
            open_timeout,
        })
    }

    fn path_for(&self, locator: &str) -> PathBuf {
        self.data_dir.join(format!("{locator}.redb"))
    }
}

#[async_trait]
impl ConnectionFactory for RedbConnectionFactory {
    fn name(&self) -> &'static str {
        "redb"
    }

    async fn open(&self, locator: &str) -> anyhow::Result<Arc<dyn TenantConnection>> {
        validate_locator(locator)?;
        let path = self.path_for(locator);
        let open = blocking(move || Ok(Database::create(path)?));
        let db = tokio::time::timeout(self.open_timeout, open)
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "opening {locator} exceeded {}ms",
                    self.open_timeout.as_millis()
                )
            })??;

        let id = ConnectionId::next();
        debug!(%locator, %id, "redb store opened");
        Ok(Arc::new(RedbConnection {
            id,
            locator: locator.to_string(),
            db: RwLock::new(Some(Arc::new(db))),
            lost: AtomicBool::new(false),
        }))
    }
}

/// Handle to one open redb file. `close()` drops the database; an I/O
/// failure marks the handle disconnected so the cache replaces it.
#[derive(Debug)]
pub struct RedbConnection {
    id: ConnectionId,
    locator: String,
    db: RwLock<Option<Arc<Database>>>,
    lost: AtomicBool,
}

impl RedbConnection {
    /// Passes `result` through, remembering an I/O failure of the file.
    fn observe<T>(&self, result: anyhow::Result<T>) -> anyhow::Result<T> {
        if let Err(e) = &result {
            if is_io_failure(e) && !self.lost.swap(true, Ordering::AcqRel) {
                warn!(locator = %self.locator, id = %self.id, error = %e, "redb store failed");
            }
        }
        result
    }

    fn database(&self) -> anyhow::Result<Arc<Database>> {
        self.db
            .read()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("connection {} to {} is closed", self.id, self.locator))
    }
}

#[async_trait]
impl TenantConnection for RedbConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn locator(&self) -> &str {
        &self.locator
    }

    fn is_connected(&self) -> bool {
        self.db.read().is_some() && !self.lost.load(Ordering::Acquire)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        let db = self.database()?;
        let result = blocking(move || {
            db.begin_read()?;
            Ok(())
        })
        .await;
        self.observe(result)
    }

    async fn load(&self, collection: &str, key: &str) -> anyhow::Result<Option<Value>> {
        let db = self.database()?;
        let collection = collection.to_string();
        let key = key.to_string();
        let result = blocking(move || {
            let txn = db.begin_read()?;
            let table = match txn.open_table(TableDefinition::<&str, &[u8]>::new(&collection)) {
                Ok(table) => table,
                Err(TableError::TableDoesNotExist(_)) => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let doc = match table.get(key.as_str())? {
                Some(guard) => Some(serde_json::from_slice(guard.value())?),
                None => None,
            };
            Ok(doc)
        })
        .await;
        self.observe(result)
    }

    async fn load_all(&self, collection: &str) -> anyhow::Result<Vec<(String, Value)>> {
        let db = self.database()?;
        let collection = collection.to_string();
        let result = blocking(move || {
            let txn = db.begin_read()?;
            let table = match txn.open_table(TableDefinition::<&str, &[u8]>::new(&collection)) {
                Ok(table) => table,
                Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            };
            let mut docs = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                docs.push((key.value().to_string(), serde_json::from_slice(value.value())?));
            }
            Ok(docs)
        })
        .await;
        self.observe(result)
    }

    async fn store(&self, collection: &str, key: &str, value: &Value) -> anyhow::Result<()> {
        let db = self.database()?;
        let collection = collection.to_string();
        let key = key.to_string();
        let bytes = serde_json::to_vec(value)?;
        let result = blocking(move || {
            let txn = db.begin_write()?;
            {
                let mut table = txn.open_table(TableDefinition::<&str, &[u8]>::new(&collection))?;
                table.insert(key.as_str(), bytes.as_slice())?;
            }
            txn.commit()?;
            Ok(())
        })
        .await;
        self.observe(result)
    }

    async fn delete(&self, collection: &str, key: &str) -> anyhow::Result<bool> {
        let db = self.database()?;
        let collection = collection.to_string();
        let key = key.to_string();
        let result = blocking(move || {
            let txn = db.begin_write()?;
            let existed;
            {
                let mut table = txn.open_table(TableDefinition::<&str, &[u8]>::new(&collection))?;
                existed = table.remove(key.as_str())?.is_some();
            }
            txn.commit()?;
            Ok(existed)
        })
        .await;
        self.observe(result)
    }

    async fn close(&self) -> anyhow::Result<()> {
        if self.db.write().take().is_some() {
            debug!(locator = %self.locator, id = %self.id, "redb store closed");
        }
        Ok(())
    }
}

/// Registry catalog persisted in its own redb file, kept apart from tenant
/// files (see [`redb_catalog_path`](crate::storage::redb_catalog_path)).
#[derive(Clone)]
pub struct RedbTenantStore {
    db: Arc<Database>,
}

impl RedbTenantStore {
    /// Opens (or creates) the catalog database at `path`, creating its
    /// parent directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the table created.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;
        let txn = db.begin_write()?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(TENANTS)?;
        txn.commit()?;
        debug!(?path, "tenant catalog opened");
        Ok(Self { db: Arc::new(db) })
    }
}

#[async_trait]
impl TenantStore for RedbTenantStore {
    async fn load_all(&self) -> anyhow::Result<Vec<TenantRecord>> {
        let db = Arc::clone(&self.db);
        blocking(move || {
            let txn = db.begin_read()?;
            let table = txn.open_table(TENANTS)?;
            let mut records = Vec::new();
            for entry in table.iter()? {
                let (_, value) = entry?;
                records.push(serde_json::from_slice(value.value())?);
            }
            Ok(records)
        })
        .await
    }

    async fn store(&self, record: &TenantRecord) -> anyhow::Result<()> {
        let db = Arc::clone(&self.db);
        let key = record.tenant_id.to_string();
        let bytes = serde_json::to_vec(record)?;
        blocking(move || {
            let txn = db.begin_write()?;
            {
                let mut table = txn.open_table(TENANTS)?;
                table.insert(key.as_str(), bytes.as_slice())?;
            }
            txn.commit()?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use coursegate_core::{TenantId, TenantStatus};
    use serde_json::json;

    use super::*;

    fn factory(dir: &tempfile::TempDir) -> RedbConnectionFactory {
        RedbConnectionFactory::new(dir.path(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn documents_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let factory = factory(&dir);

        let conn = factory.open("tenant_ngo").await.unwrap();
        conn.store("courses", "c1", &json!({"title": "Intro"})).await.unwrap();
        conn.store("courses", "c2", &json!({"title": "Advanced"})).await.unwrap();
        conn.close().await.unwrap();
        assert!(!conn.is_connected());
        drop(conn);

        let reopened = factory.open("tenant_ngo").await.unwrap();
        let all = reopened.load_all("courses").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0, "c1");
        assert!(dir.path().join("tenant_ngo.redb").exists());
    }

    #[tokio::test]
    async fn missing_collection_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let conn = factory(&dir).open("tenant_a").await.unwrap();
        assert!(conn.load("nothing", "k").await.unwrap().is_none());
        assert!(conn.load_all("nothing").await.unwrap().is_empty());
        conn.ping().await.unwrap();
    }

    #[tokio::test]
    async fn delete_and_closed_handle() {
        let dir = tempfile::tempdir().unwrap();
        let conn = factory(&dir).open("tenant_a").await.unwrap();
        conn.store("modules", "m1", &json!(1)).await.unwrap();
        assert!(conn.delete("modules", "m1").await.unwrap());
        assert!(!conn.delete("modules", "m1").await.unwrap());

        conn.close().await.unwrap();
        assert!(conn.ping().await.is_err());
    }

    #[test]
    fn io_errors_are_recognized_through_redb_wrappers() {
        let missing: anyhow::Error = TableError::TableDoesNotExist("courses".to_string()).into();
        assert!(!is_io_failure(&missing));
        assert!(!is_io_failure(&anyhow::anyhow!("malformed document")));

        let io = || StorageError::Io(std::io::Error::other("disk gone"));
        assert!(is_io_failure(&io().into()));
        assert!(is_io_failure(&TransactionError::Storage(io()).into()));
        assert!(is_io_failure(&TableError::Storage(io()).into()));
        assert!(is_io_failure(&CommitError::Storage(io()).into()));
    }

    #[tokio::test]
    async fn observed_io_failure_disconnects_open_handle() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::create(dir.path().join("tenant_b.redb")).unwrap();
        let conn = RedbConnection {
            id: ConnectionId::next(),
            locator: "tenant_b".to_string(),
            db: RwLock::new(Some(Arc::new(db))),
            lost: AtomicBool::new(false),
        };
        assert!(conn.is_connected());

        let not_io: anyhow::Result<()> = Err(anyhow::anyhow!("malformed document"));
        assert!(conn.observe(not_io).is_err());
        assert!(conn.is_connected());

        let io: anyhow::Result<()> = Err(StorageError::Io(std::io::Error::other("disk gone")).into());
        assert!(conn.observe(io).is_err());
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn catalog_round_trips_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbTenantStore::open(&dir.path().join("catalog.redb")).unwrap();
        let record = TenantRecord {
            tenant_id: TenantId::new("ngo"),
            display_name: "NGO".to_string(),
            status: TenantStatus::Suspended,
            storage_locator: "tenant_ngo".to_string(),
            metadata: BTreeMap::from([("plan".to_string(), "free".to_string())]),
            created_at_ms: 10,
            updated_at_ms: 20,
        };
        store.store(&record).await.unwrap();
        assert_eq!(store.load_all().await.unwrap(), vec![record]);
    }
}
