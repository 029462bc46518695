use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of an isolated tenant (organization) whose data lives in its own store.
///
/// Unique across the registry and immutable once the tenant has been created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Wraps an already-normalized identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TenantId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Administrative status of a tenant.
///
/// Only `Active` tenants may have connections acquired on their behalf.
/// Deactivation is a soft state change; the tenant's store is never dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    Inactive,
    Suspended,
}

impl TenantStatus {
    #[must_use]
    pub fn is_active(self) -> bool {
        self == Self::Active
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Suspended => "suspended",
        }
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry entry describing one tenant and where its data lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantRecord {
    /// Normalized identifier. Immutable after creation.
    pub tenant_id: TenantId,
    /// Human-readable organization name. Unique (case-insensitive).
    pub display_name: String,
    pub status: TenantStatus,
    /// Opaque locator used by the connection factory to reach the tenant's
    /// physical store (e.g. a database or file name). Immutable after creation.
    pub storage_locator: String,
    /// Free-form administrative metadata (plan, contact, etc.).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Creation time in milliseconds since Unix epoch.
    pub created_at_ms: u64,
    /// Last administrative update in milliseconds since Unix epoch.
    pub updated_at_ms: u64,
}

/// Lifecycle stage of a cached tenant connection.
///
/// State machine: Connecting -> Ready -> Degraded | Closed. A degraded entry is
/// replaced by a fresh one, never repaired in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessState {
    /// The handshake with the tenant's store is still in progress.
    Connecting,
    /// The handshake completed and the handle may be shared by requests.
    Ready,
    /// A probe or an operation reported the handle unusable.
    Degraded,
    /// The handle was evicted or shut down.
    Closed,
}

impl ReadinessState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
            Self::Closed => "closed",
        }
    }

    /// Compact encoding for storage in an `AtomicU8`.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Connecting => 0,
            Self::Ready => 1,
            Self::Degraded => 2,
            Self::Closed => 3,
        }
    }

    /// Decodes [`as_u8`](Self::as_u8). Unknown values decode as `Closed`.
    #[must_use]
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Ready,
            2 => Self::Degraded,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_state_u8_encoding_is_stable() {
        for state in [
            ReadinessState::Connecting,
            ReadinessState::Ready,
            ReadinessState::Degraded,
            ReadinessState::Closed,
        ] {
            assert_eq!(ReadinessState::from_u8(state.as_u8()), state);
        }
        assert_eq!(ReadinessState::from_u8(200), ReadinessState::Closed);
    }

    #[test]
    fn tenant_status_serializes_lowercase() {
        let json = serde_json::to_string(&TenantStatus::Suspended).unwrap();
        assert_eq!(json, "\"suspended\"");
        let back: TenantStatus = serde_json::from_str("\"inactive\"").unwrap();
        assert_eq!(back, TenantStatus::Inactive);
        assert!(!back.is_active());
    }

    #[test]
    fn tenant_record_uses_camel_case_fields() {
        let record = TenantRecord {
            tenant_id: TenantId::new("ngo"),
            display_name: "NGO".to_string(),
            status: TenantStatus::Active,
            storage_locator: "tenant_ngo".to_string(),
            metadata: BTreeMap::new(),
            created_at_ms: 1,
            updated_at_ms: 1,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["tenantId"], "ngo");
        assert_eq!(json["storageLocator"], "tenant_ngo");
        assert_eq!(json["status"], "active");
    }

    #[test]
    fn tenant_id_borrows_as_str() {
        let mut set = std::collections::HashSet::new();
        set.insert(TenantId::new("acme"));
        assert!(set.contains("acme"));
    }
}
