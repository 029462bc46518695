//! Per-tenant storage backends.
//!
//! Each backend provides a [`ConnectionFactory`](crate::traits::ConnectionFactory)
//! that opens an isolated store per storage locator, plus a
//! [`TenantStore`](crate::traits::TenantStore) for the registry catalog:
//!
//! - **memory**: in-process stores, used by tests and `--backend memory`
//! - **redb** (default feature): one embedded database file per tenant
//! - **postgres** (optional feature): one connection pool per tenant database

pub mod datastores;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub use datastores::*;
use tracing::info;

use crate::traits::{ConnectionFactory, TenantStore};

/// Maximum locator length; matches the `PostgreSQL` identifier limit.
pub const MAX_LOCATOR_LEN: usize = 63;

/// Rejects locators that are unsafe as a file or database name.
///
/// # Errors
///
/// Returns an error if the locator is empty, longer than [`MAX_LOCATOR_LEN`],
/// or contains characters other than ASCII alphanumerics, `_`, and `-`.
pub fn validate_locator(locator: &str) -> anyhow::Result<()> {
    if locator.is_empty() || locator.len() > MAX_LOCATOR_LEN {
        anyhow::bail!("storage locator must be 1..={MAX_LOCATOR_LEN} characters: {locator:?}");
    }
    if !locator
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        anyhow::bail!("storage locator contains unsupported characters: {locator:?}");
    }
    Ok(())
}

/// Location of the redb registry catalog inside `data_dir`.
///
/// Tenant files are `<data_dir>/<locator>.redb` and locators cannot contain
/// a path separator, so no locator can name the catalog file.
#[must_use]
pub fn redb_catalog_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("_catalog").join("tenants.redb")
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    Memory,
    Redb,
    Postgres,
}

/// How tenant stores and the registry catalog are reached.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub backend: Backend,
    /// Directory holding per-tenant redb files and the catalog.
    pub data_dir: PathBuf,
    /// Server URL for the postgres backend. Its database holds the catalog.
    pub database_url: Option<String>,
    /// Pool size per tenant database (postgres).
    pub max_connections: u32,
    /// Handshake timeout enforced by the backend itself.
    pub open_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            data_dir: PathBuf::from("data"),
            database_url: None,
            max_connections: 5,
            open_timeout: Duration::from_secs(5),
        }
    }
}

/// Builds the connection factory and catalog store for `config`.
///
/// # Errors
///
/// Returns an error if the backend is not compiled in, is misconfigured, or
/// its catalog cannot be opened.
pub async fn open_backend(
    config: &ConnectionConfig,
) -> anyhow::Result<(Arc<dyn ConnectionFactory>, Arc<dyn TenantStore>)> {
    info!(backend = ?config.backend, "opening storage backend");
    match config.backend {
        Backend::Memory => Ok((
            Arc::new(MemoryConnectionFactory::new()),
            Arc::new(MemoryTenantStore::new()),
        )),
        #[cfg(feature = "redb")]
        Backend::Redb => {
            let factory = RedbConnectionFactory::new(&config.data_dir, config.open_timeout)?;
            let store = RedbTenantStore::open(&redb_catalog_path(&config.data_dir))?;
            Ok((Arc::new(factory), Arc::new(store)))
        }
        #[cfg(feature = "postgres")]
        Backend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("the postgres backend requires a database URL"))?;
            let factory = PgConnectionFactory::new(url, config.max_connections, config.open_timeout)?;
            let store = PgTenantStore::connect(url, config.open_timeout).await?;
            Ok((Arc::new(factory), Arc::new(store)))
        }
        #[allow(unreachable_patterns)]
        other => anyhow::bail!("backend {other:?} is not compiled into this build"),
    }
}
