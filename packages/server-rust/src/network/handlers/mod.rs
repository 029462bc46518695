//! HTTP handler definitions for the `coursegate` server.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for building the router.

pub mod admin;
pub mod courses;
pub mod health;

pub use admin::{
    create_tenant_handler, evict_connection_handler, list_connections_handler,
    list_tenants_handler, set_status_handler, switch_tenant_handler, update_tenant_handler,
};
pub use courses::{create_course_handler, get_course_handler, list_courses_handler};
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use super::resolve::TenantResolver;
use super::{NetworkConfig, ShutdownController};
use crate::tenancy::{AdminSurface, ConnectionCache, QueryDeadline};

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Per-tenant connection cache; also gives access to the registry.
    pub cache: Arc<ConnectionCache>,
    /// Operator operations over registry and cache.
    pub admin: AdminSurface,
    /// Tenant identifier extraction for tenant-scoped routes.
    pub resolver: Arc<TenantResolver>,
    /// Deadline applied to storage operations of tenant-scoped handlers.
    pub deadline: QueryDeadline,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Network configuration (bind address, TLS, resolution sources).
    pub config: Arc<NetworkConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::AppState;
    use crate::network::resolve::TenantResolver;
    use crate::network::{NetworkConfig, ShutdownController};
    use crate::tenancy::testing::{fixture, Fixture};
    use crate::tenancy::{AdminSurface, CacheConfig, QueryDeadline};

    /// App state over the tenancy test fixture, resolving from `x-tenant-id`.
    pub(crate) async fn app_state(tenants: &[&str]) -> (AppState, Fixture) {
        let fixture = fixture(tenants, CacheConfig::default()).await;
        let config = NetworkConfig::default();
        let state = AppState {
            cache: fixture.cache.clone(),
            admin: AdminSurface::new(fixture.cache.clone()),
            resolver: Arc::new(TenantResolver::new(&config.resolution).unwrap()),
            deadline: QueryDeadline::new(Duration::from_secs(1)),
            shutdown: Arc::new(ShutdownController::new()),
            config: Arc::new(config),
            start_time: Instant::now(),
        };
        (state, fixture)
    }
}
