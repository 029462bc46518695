//! JSON payloads exchanged with the administrative HTTP surface.
//!
//! All structs use `#[serde(rename_all = "camelCase")]` so the wire format
//! reads `tenantId`, `lastUsed`, and so on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{ReadinessState, TenantId, TenantStatus};

// ---------------------------------------------------------------------------
// Connection switching and introspection
// ---------------------------------------------------------------------------

/// Body of `POST /admin/tenants/switch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchTenantRequest {
    pub tenant_id: String,
}

/// Outcome of a manual tenant switch. Failures are reported, never thrown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchTenantResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ReadinessState>,
}

/// One row of the active-connections snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveConnection {
    pub tenant_id: TenantId,
    pub state: ReadinessState,
    /// Milliseconds since Unix epoch. For entries still connecting this is
    /// the time the handshake started.
    pub last_used: u64,
    pub created_at: u64,
    /// Identity of the underlying handle. Absent while connecting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<u64>,
}

// ---------------------------------------------------------------------------
// Tenant administration
// ---------------------------------------------------------------------------

/// Body of `POST /admin/tenants`.
///
/// `tenant_id` is derived from `display_name` when absent; `storage_locator`
/// is derived from the identifier when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTenantRequest {
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub display_name: String,
    #[serde(default)]
    pub storage_locator: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Body of `PATCH /admin/tenants/{tenant_id}`.
///
/// `tenant_id` and `storage_locator` are accepted for compatibility with
/// permissive admin tooling but are ignored: both are immutable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTenantRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub status: Option<TenantStatus>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub storage_locator: Option<String>,
}

/// Body of `PUT /admin/tenants/{tenant_id}/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetStatusRequest {
    pub status: TenantStatus,
}

/// Error body returned for every request-terminating failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    /// Stable machine-readable code, e.g. `"TENANT_NOT_FOUND"`.
    pub code: String,
    /// Whether the caller may retry the same request later.
    pub retryable: bool,
}
