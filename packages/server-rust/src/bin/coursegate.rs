//! coursegate: the tenant connection manager daemon.
//!
//! Opens the storage backend, hydrates the tenant registry, starts the
//! connection cache and idle reaper, then serves the HTTP surface until
//! Ctrl-C.
//!
//! ```text
//! coursegate --backend redb --data-dir /var/lib/coursegate --port 8080
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use coursegate_core::SystemClock;
use coursegate_server::network::{
    NetworkConfig, NetworkModule, ResolutionConfig, TenantSource, TlsConfig,
};
use coursegate_server::service::{ServiceContext, ServiceRegistry, TenancyConfig};
use coursegate_server::storage::{open_backend, Backend, ConnectionConfig};
use coursegate_server::tenancy::{ConnectionCache, IdleReaper, QueryDeadline, TenantRegistry};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Where a request's tenant identifier is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    Header,
    Subdomain,
    Bearer,
}

#[derive(Parser)]
#[command(name = "coursegate", about = "Multi-tenant LMS tenant connection manager")]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "COURSEGATE_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on; 0 picks a free port.
    #[arg(long, env = "COURSEGATE_PORT", default_value = "8080")]
    port: u16,

    /// Storage backend for tenant databases and the tenant catalog.
    #[arg(long, env = "COURSEGATE_BACKEND", value_enum, default_value = "redb")]
    backend: Backend,

    /// Directory for redb tenant files and the catalog.
    #[arg(long, env = "COURSEGATE_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Postgres server URL (postgres backend only).
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Pool size per tenant database (postgres backend only).
    #[arg(long, env = "COURSEGATE_MAX_CONNECTIONS", default_value = "5")]
    max_connections: u32,

    /// Connection handshake timeout in milliseconds.
    #[arg(long, env = "COURSEGATE_CREATION_TIMEOUT_MS", default_value = "10000")]
    creation_timeout_ms: u64,

    /// Health probe timeout in milliseconds.
    #[arg(long, env = "COURSEGATE_PROBE_TIMEOUT_MS", default_value = "2000")]
    probe_timeout_ms: u64,

    /// Per-query deadline in milliseconds.
    #[arg(long, env = "COURSEGATE_QUERY_TIMEOUT_MS", default_value = "10000")]
    query_timeout_ms: u64,

    /// Idle time after which a cached connection is evicted; 0 disables.
    #[arg(long, env = "COURSEGATE_IDLE_TIMEOUT_MS", default_value = "1800000")]
    idle_timeout_ms: u64,

    /// How often the reaper sweeps and probes, in milliseconds.
    #[arg(long, env = "COURSEGATE_REAPER_INTERVAL_MS", default_value = "60000")]
    reaper_interval_ms: u64,

    /// Prefix of derived storage locators.
    #[arg(long, env = "COURSEGATE_LOCATOR_PREFIX", default_value = "tenant_")]
    locator_prefix: String,

    /// Tenant identifier sources, in priority order.
    #[arg(
        long = "tenant-source",
        env = "COURSEGATE_TENANT_SOURCES",
        value_enum,
        value_delimiter = ',',
        default_value = "header"
    )]
    tenant_sources: Vec<SourceKind>,

    /// Header carrying the tenant identifier.
    #[arg(long, env = "COURSEGATE_TENANT_HEADER", default_value = "x-tenant-id")]
    tenant_header: String,

    /// Base domain for subdomain resolution, e.g. `lms.example.com`.
    #[arg(long, env = "COURSEGATE_BASE_DOMAIN")]
    base_domain: Option<String>,

    /// Bearer token claim holding the tenant identifier.
    #[arg(long, env = "COURSEGATE_JWT_CLAIM", default_value = "tenant")]
    jwt_claim: String,

    /// HS256 secret for bearer token validation.
    #[arg(long, env = "COURSEGATE_JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    /// Allowed CORS origins; `*` allows any.
    #[arg(long, env = "COURSEGATE_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    cors_origins: Vec<String>,

    /// TLS certificate (PEM). Requires `--tls-key`.
    #[arg(long, env = "COURSEGATE_TLS_CERT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    /// TLS private key (PEM). Requires `--tls-cert`.
    #[arg(long, env = "COURSEGATE_TLS_KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, env = "COURSEGATE_LOG_JSON")]
    log_json: bool,

    /// Serve Prometheus metrics on this address.
    #[arg(long, env = "COURSEGATE_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,
}

impl Cli {
    fn tenancy_config(&self) -> TenancyConfig {
        TenancyConfig {
            creation_timeout_ms: self.creation_timeout_ms,
            probe_timeout_ms: self.probe_timeout_ms,
            query_timeout_ms: self.query_timeout_ms,
            idle_timeout_ms: self.idle_timeout_ms,
            reaper_interval_ms: self.reaper_interval_ms,
            locator_prefix: self.locator_prefix.clone(),
        }
    }

    fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            backend: self.backend,
            data_dir: self.data_dir.clone(),
            database_url: self.database_url.clone(),
            max_connections: self.max_connections,
            open_timeout: Duration::from_millis(self.creation_timeout_ms),
        }
    }

    fn network_config(&self) -> anyhow::Result<NetworkConfig> {
        let mut sources = Vec::with_capacity(self.tenant_sources.len());
        for kind in &self.tenant_sources {
            sources.push(match kind {
                SourceKind::Header => TenantSource::Header {
                    name: self.tenant_header.clone(),
                },
                SourceKind::Subdomain => TenantSource::Subdomain {
                    base_domain: self
                        .base_domain
                        .clone()
                        .context("--base-domain is required for subdomain resolution")?,
                },
                SourceKind::Bearer => TenantSource::BearerClaim {
                    claim: self.jwt_claim.clone(),
                    secret: self
                        .jwt_secret
                        .clone()
                        .context("--jwt-secret is required for bearer resolution")?,
                },
            });
        }

        let tls = match (&self.tls_cert, &self.tls_key) {
            (Some(cert_path), Some(key_path)) => Some(TlsConfig {
                cert_path: cert_path.clone(),
                key_path: key_path.clone(),
            }),
            _ => None,
        };

        Ok(NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            tls,
            cors_origins: self.cors_origins.clone(),
            resolution: ResolutionConfig { sources },
            ..NetworkConfig::default()
        })
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,coursegate=debug,coursegate_server=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    if let Some(addr) = cli.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to start the Prometheus listener")?;
        info!(%addr, "metrics listener started");
    }

    let tenancy = Arc::new(cli.tenancy_config());
    let network = cli.network_config()?;

    let (factory, store) = open_backend(&cli.connection_config()).await?;
    info!(backend = factory.name(), "storage backend opened");

    let registry = Arc::new(
        TenantRegistry::load(store, Arc::new(SystemClock), tenancy.locator_prefix.clone())
            .await
            .context("failed to load the tenant catalog")?,
    );
    info!(tenants = registry.len(), "tenant registry loaded");

    let cache = Arc::new(ConnectionCache::new(
        registry,
        factory,
        Arc::new(SystemClock),
        tenancy.cache_config(),
    ));

    let services = ServiceRegistry::new();
    services.register_shared(Arc::clone(&cache));
    services.register(IdleReaper::new(Arc::clone(&cache)));

    let mut module = NetworkModule::new(
        network,
        Arc::clone(&cache),
        QueryDeadline::new(tenancy.query_timeout()),
    )?;
    let port = module.start().await?;

    services
        .init_all(&ServiceContext {
            config: Arc::clone(&tenancy),
        })
        .await?;

    info!(port, "coursegate ready");
    let served = module
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await;

    services.shutdown_all(false).await?;
    served?;
    info!("coursegate stopped");
    Ok(())
}
