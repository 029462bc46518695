//! `PostgreSQL` storage backend: one database per tenant, one pool per database.
//!
//! The storage locator is used as the database name on the configured server;
//! the database is created on first open.
//! The handle handed to requests is a `PgPool`, so concurrent operations over
//! one tenant connection are safe. The registry catalog lives in the database
//! named by the configured URL.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coursegate_core::TenantRecord;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use crate::storage::validate_locator;
use crate::traits::{ConnectionFactory, ConnectionId, TenantConnection, TenantStore};

const CREATE_DOCUMENTS: &str = r"
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    key        TEXT NOT NULL,
    value      JSONB NOT NULL,
    PRIMARY KEY (collection, key)
)";

const CREATE_TENANTS: &str = r"
CREATE TABLE IF NOT EXISTS tenants (
    tenant_id TEXT PRIMARY KEY,
    record    JSONB NOT NULL
)";

/// Opens a `PgPool` against `<server>/<locator>`, creating the tenant
/// database on first use.
#[derive(Debug, Clone)]
pub struct PgConnectionFactory {
    base: PgConnectOptions,
    /// Lazily connected pool on the URL's own database, used to look up and
    /// create tenant databases.
    admin: PgPool,
    max_connections: u32,
    connect_timeout: Duration,
}

impl PgConnectionFactory {
    /// Builds a factory from a server URL. Any database in the URL is
    /// replaced by the tenant's locator on each `open()`. Avoid logging the
    /// URL; it may carry credentials. Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed.
    pub fn new(url: &str, max_connections: u32, connect_timeout: Duration) -> anyhow::Result<Self> {
        let base = PgConnectOptions::from_str(url)?;
        let admin = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(connect_timeout)
            .connect_lazy_with(base.clone());
        Ok(Self {
            base,
            admin,
            max_connections,
            connect_timeout,
        })
    }

    /// Creates the database named `locator` unless it already exists.
    async fn ensure_database(&self, locator: &str) -> anyhow::Result<()> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
                .bind(locator)
                .fetch_one(&self.admin)
                .await?;
        if exists {
            return Ok(());
        }
        match sqlx::query(&create_database_sql(locator))
            .execute(&self.admin)
            .await
        {
            Ok(_) => {
                info!(%locator, "tenant database created");
                Ok(())
            }
            // Created concurrently by another process.
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(DUPLICATE_DATABASE) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// SQLSTATE `duplicate_database`.
const DUPLICATE_DATABASE: &str = "42P04";

/// `CREATE DATABASE` cannot take bind parameters. Callers pass a locator
/// already checked by `validate_locator`, which leaves no character that
/// can end the quoted identifier.
fn create_database_sql(locator: &str) -> String {
    format!("CREATE DATABASE \"{locator}\"")
}

/// Errors that mean the server or the pool is gone rather than the query
/// being wrong.
fn is_transport_error(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn open(&self, locator: &str) -> anyhow::Result<Arc<dyn TenantConnection>> {
        validate_locator(locator)?;
        self.ensure_database(locator).await?;
        let options = self.base.clone().database(locator);
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.connect_timeout)
            .connect_with(options)
            .await?;
        sqlx::query(CREATE_DOCUMENTS).execute(&pool).await?;

        let id = ConnectionId::next();
        debug!(%locator, %id, "postgres pool opened");
        Ok(Arc::new(PgConnection {
            id,
            locator: locator.to_string(),
            pool,
            lost: AtomicBool::new(false),
        }))
    }
}

/// Pooled connection to one tenant database.
///
/// Reports itself disconnected once closed or once an operation failed at
/// the transport level; the cache then replaces it.
#[derive(Debug)]
pub struct PgConnection {
    id: ConnectionId,
    locator: String,
    pool: PgPool,
    lost: AtomicBool,
}

impl PgConnection {
    fn observe<T>(&self, result: Result<T, sqlx::Error>) -> anyhow::Result<T> {
        result.map_err(|e| {
            if is_transport_error(&e) && !self.lost.swap(true, Ordering::AcqRel) {
                warn!(locator = %self.locator, id = %self.id, error = %e, "postgres connection lost");
            }
            e.into()
        })
    }
}

#[async_trait]
impl TenantConnection for PgConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn locator(&self) -> &str {
        &self.locator
    }

    fn is_connected(&self) -> bool {
        !self.pool.is_closed() && !self.lost.load(Ordering::Acquire)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        self.observe(sqlx::query("SELECT 1").execute(&self.pool).await)?;
        Ok(())
    }

    async fn load(&self, collection: &str, key: &str) -> anyhow::Result<Option<Value>> {
        let row: Option<Json<Value>> = self.observe(
            sqlx::query_scalar("SELECT value FROM documents WHERE collection = $1 AND key = $2")
                .bind(collection)
                .bind(key)
                .fetch_optional(&self.pool)
                .await,
        )?;
        Ok(row.map(|Json(value)| value))
    }

    async fn load_all(&self, collection: &str) -> anyhow::Result<Vec<(String, Value)>> {
        let rows: Vec<(String, Json<Value>)> = self.observe(
            sqlx::query_as("SELECT key, value FROM documents WHERE collection = $1 ORDER BY key")
                .bind(collection)
                .fetch_all(&self.pool)
                .await,
        )?;
        Ok(rows.into_iter().map(|(key, Json(value))| (key, value)).collect())
    }

    async fn store(&self, collection: &str, key: &str, value: &Value) -> anyhow::Result<()> {
        self.observe(
            sqlx::query(
                "INSERT INTO documents (collection, key, value) VALUES ($1, $2, $3) \
                 ON CONFLICT (collection, key) DO UPDATE SET value = EXCLUDED.value",
            )
            .bind(collection)
            .bind(key)
            .bind(Json(value))
            .execute(&self.pool)
            .await,
        )?;
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> anyhow::Result<bool> {
        let result = self.observe(
            sqlx::query("DELETE FROM documents WHERE collection = $1 AND key = $2")
                .bind(collection)
                .bind(key)
                .execute(&self.pool)
                .await,
        )?;
        Ok(result.rows_affected() > 0)
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Registry catalog stored as JSON documents in a `tenants` table.
#[derive(Debug, Clone)]
pub struct PgTenantStore {
    pool: PgPool,
}

impl PgTenantStore {
    /// Connects to the catalog database and creates the table if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable or the URL is invalid.
    pub async fn connect(url: &str, connect_timeout: Duration) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(connect_timeout)
            .connect_with(PgConnectOptions::from_str(url)?)
            .await?;
        sqlx::query(CREATE_TENANTS).execute(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl TenantStore for PgTenantStore {
    async fn load_all(&self) -> anyhow::Result<Vec<TenantRecord>> {
        let rows: Vec<Json<TenantRecord>> =
            sqlx::query_scalar("SELECT record FROM tenants ORDER BY tenant_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|Json(record)| record).collect())
    }

    async fn store(&self, record: &TenantRecord) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO tenants (tenant_id, record) VALUES ($1, $2) \
             ON CONFLICT (tenant_id) DO UPDATE SET record = EXCLUDED.record",
        )
        .bind(record.tenant_id.as_str())
        .bind(Json(record))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
