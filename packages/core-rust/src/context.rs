use crate::types::TenantId;

/// Per-request context carrying the resolved tenant and tracing information.
///
/// Built by the tenant resolution middleware at request entry and dropped at
/// request end. Never cached beyond the request that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Tenant the request was resolved to.
    pub tenant_id: TenantId,
    /// Correlation identifier (the `x-request-id` header when present).
    pub request_id: String,
}

impl RequestContext {
    pub fn new(tenant_id: TenantId, request_id: impl Into<String>) -> Self {
        Self {
            tenant_id,
            request_id: request_id.into(),
        }
    }
}
