//! Operator-facing operations over the registry and the connection cache.

use std::sync::Arc;

use coursegate_core::messages::{
    ActiveConnection, CreateTenantRequest, SwitchTenantResponse, UpdateTenantRequest,
};
use coursegate_core::{ReadinessState, TenantRecord, TenantStatus};
use tracing::{info, warn};

use super::cache::ConnectionCache;
use super::error::TenantError;
use super::registry::TenantRegistry;

#[derive(Clone)]
pub struct AdminSurface {
    cache: Arc<ConnectionCache>,
}

impl AdminSurface {
    #[must_use]
    pub fn new(cache: Arc<ConnectionCache>) -> Self {
        Self { cache }
    }

    fn registry(&self) -> &Arc<TenantRegistry> {
        self.cache.registry()
    }

    /// Acquires `tenant_id` outside the request path to pre-warm or verify
    /// its connection. Failures are reported in the response, never raised.
    pub async fn switch_to(&self, tenant_id: &str) -> SwitchTenantResponse {
        match self.cache.acquire(tenant_id).await {
            Ok(handle) => {
                info!(tenant_id, connection_id = %handle.id(), "switched to tenant");
                SwitchTenantResponse {
                    success: true,
                    message: format!("connected to tenant {tenant_id} ({})", handle.id()),
                    state: Some(ReadinessState::Ready),
                }
            }
            Err(e) => {
                warn!(tenant_id, error = %e, "tenant switch failed");
                SwitchTenantResponse {
                    success: false,
                    message: e.to_string(),
                    state: None,
                }
            }
        }
    }

    /// Snapshot of cached connections. Never waits on creations in progress.
    #[must_use]
    pub fn list_active(&self) -> Vec<ActiveConnection> {
        self.cache.snapshot()
    }

    /// Closes and forgets the cached connection for `tenant_id`.
    pub async fn evict(&self, tenant_id: &str) -> bool {
        self.cache.evict(tenant_id).await
    }

    #[must_use]
    pub fn list_tenants(&self) -> Vec<TenantRecord> {
        self.registry().list()
    }

    /// # Errors
    ///
    /// See [`TenantRegistry::create`].
    pub async fn create_tenant(
        &self,
        request: CreateTenantRequest,
    ) -> Result<TenantRecord, TenantError> {
        self.registry().create(request).await
    }

    /// # Errors
    ///
    /// See [`TenantRegistry::update`].
    pub async fn update_tenant(
        &self,
        tenant_id: &str,
        request: UpdateTenantRequest,
    ) -> Result<TenantRecord, TenantError> {
        let record = self.registry().update(tenant_id, request).await?;
        self.release_if_inactive(&record).await;
        Ok(record)
    }

    /// Changes a tenant's status. Moving away from `active` also closes the
    /// tenant's cached connection.
    ///
    /// # Errors
    ///
    /// See [`TenantRegistry::set_status`].
    pub async fn set_status(
        &self,
        tenant_id: &str,
        status: TenantStatus,
    ) -> Result<TenantRecord, TenantError> {
        let record = self.registry().set_status(tenant_id, status).await?;
        self.release_if_inactive(&record).await;
        Ok(record)
    }

    async fn release_if_inactive(&self, record: &TenantRecord) {
        if !record.status.is_active() && self.cache.evict(record.tenant_id.as_str()).await {
            info!(
                tenant_id = %record.tenant_id,
                status = %record.status,
                "released connection of non-active tenant"
            );
        }
    }
}
