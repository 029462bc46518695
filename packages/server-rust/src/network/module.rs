//! Network module with deferred startup lifecycle.
//!
//! `new()` assembles shared state, `start()` binds the TCP listener, and
//! `serve()` starts accepting connections. The tenancy services are
//! initialized between `start()` and `serve()`, so the port is known early
//! while readiness only flips once everything is in place.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::{NetworkConfig, TlsConfig};
use super::handlers::{
    create_course_handler, create_tenant_handler, evict_connection_handler, get_course_handler,
    health_handler, list_connections_handler, list_courses_handler, list_tenants_handler,
    liveness_handler, readiness_handler, set_status_handler, switch_tenant_handler,
    update_tenant_handler, AppState,
};
use super::middleware::{build_http_layers, track_in_flight};
use super::resolve::{resolve_tenant, TenantResolver};
use super::shutdown::ShutdownController;
use crate::tenancy::{AdminSurface, ConnectionCache, QueryDeadline};

/// How long `serve()` waits for in-flight requests after the listener closed.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Manages the HTTP server lifecycle.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    state: AppState,
}

impl NetworkModule {
    /// Creates the module without binding any port.
    ///
    /// # Errors
    ///
    /// Returns an error if the tenant resolution sources are invalid.
    pub fn new(
        config: NetworkConfig,
        cache: Arc<ConnectionCache>,
        deadline: QueryDeadline,
    ) -> anyhow::Result<Self> {
        let resolver = Arc::new(TenantResolver::new(&config.resolution)?);
        let state = AppState {
            admin: AdminSurface::new(Arc::clone(&cache)),
            cache,
            resolver,
            deadline,
            shutdown: Arc::new(ShutdownController::new()),
            config: Arc::new(config.clone()),
            start_time: Instant::now(),
        };
        Ok(Self {
            config,
            listener: None,
            state,
        })
    }

    /// Returns a shared reference to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.state.shutdown)
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// - `GET /health`, `/health/live`, `/health/ready`
    /// - `POST /admin/tenants/switch`
    /// - `GET /admin/connections`, `DELETE /admin/connections/{tenant_id}`
    /// - `GET|POST /admin/tenants`, `PATCH /admin/tenants/{tenant_id}`,
    ///   `PUT /admin/tenants/{tenant_id}/status`
    /// - `GET|POST /api/courses`, `GET /api/courses/{id}` (tenant-scoped)
    pub fn build_router(&self) -> Router {
        let state = self.state.clone();

        let admin = Router::new()
            .route("/tenants", get(list_tenants_handler).post(create_tenant_handler))
            .route("/tenants/switch", post(switch_tenant_handler))
            .route("/tenants/{tenant_id}", patch(update_tenant_handler))
            .route("/tenants/{tenant_id}/status", put(set_status_handler))
            .route("/connections", get(list_connections_handler))
            .route("/connections/{tenant_id}", delete(evict_connection_handler));

        let api = Router::new()
            .route("/courses", get(list_courses_handler).post(create_course_handler))
            .route("/courses/{id}", get(get_course_handler))
            .route_layer(from_fn_with_state(state.clone(), resolve_tenant));

        let tracked = Router::new()
            .nest("/admin", admin)
            .nest("/api", api)
            .route_layer(from_fn_with_state(state.clone(), track_in_flight));

        Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .merge(tracked)
            .layer(build_http_layers(&self.config))
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which differs from the configured port
    /// when port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        info!(host = %self.config.host, port, "TCP listener bound");
        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves requests until `shutdown` resolves, then drains in-flight
    /// requests (up to 30 seconds) and moves the health state to Stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first, the TLS material
    /// cannot be loaded, or the server hits a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let router = self.build_router();
        let shutdown_ctrl = self.shutdown_controller();

        shutdown_ctrl.set_ready();

        match &self.config.tls {
            Some(tls) => serve_tls(listener, router, tls, shutdown).await?,
            None => serve_plain(listener, router, shutdown).await?,
        }

        drain(&shutdown_ctrl).await;
        Ok(())
    }
}

async fn serve_plain(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    info!("serving plain HTTP");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Serves TLS using `axum-server` with rustls, reusing the pre-bound listener.
async fn serve_tls(
    listener: TcpListener,
    router: Router,
    tls: &TlsConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load TLS certificates: {e}"))?;

    let addr = listener.local_addr()?;
    let std_listener = listener.into_std()?;
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();

    tokio::spawn(async move {
        shutdown.await;
        shutdown_handle.graceful_shutdown(Some(DRAIN_TIMEOUT));
    });

    info!(%addr, "serving TLS");
    axum_server::from_tcp_rustls(std_listener, rustls_config)
        .handle(handle)
        .serve(router.into_make_service())
        .await?;
    Ok(())
}

async fn drain(shutdown_ctrl: &ShutdownController) {
    shutdown_ctrl.trigger_shutdown();
    let in_flight = shutdown_ctrl.in_flight_count();
    if in_flight > 0 {
        info!(in_flight, "draining in-flight requests");
    }
    if shutdown_ctrl.wait_for_drain(DRAIN_TIMEOUT).await {
        info!("all requests drained");
    } else {
        warn!(
            in_flight = shutdown_ctrl.in_flight_count(),
            "drain timeout expired with requests remaining"
        );
    }
}
