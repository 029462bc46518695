use axum::http::StatusCode;
use coursegate_core::{TenantId, TenantStatus};

/// Failures surfaced by tenant resolution, connection acquisition, bounded
/// queries, and tenant administration.
#[derive(Debug, thiserror::Error)]
pub enum TenantError {
    #[error("request does not carry a resolvable tenant identifier")]
    IdentifierMissing,
    #[error("tenant not found: {tenant_id}")]
    NotFound { tenant_id: String },
    #[error("tenant {tenant_id} is {status}")]
    Inactive {
        tenant_id: TenantId,
        status: TenantStatus,
    },
    #[error("connection to tenant {tenant_id} unavailable: {reason}")]
    ConnectionUnavailable { tenant_id: String, reason: String },
    #[error("query exceeded its {timeout_ms}ms deadline")]
    QueryTimeout { timeout_ms: u64 },
    #[error("tenant already exists: {tenant_id}")]
    Duplicate { tenant_id: String },
    #[error("invalid tenant identifier: {input:?}")]
    InvalidIdentifier { input: String },
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl TenantError {
    /// HTTP status the error maps to when it terminates a request.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::IdentifierMissing => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Inactive { .. } => StatusCode::FORBIDDEN,
            Self::Duplicate { .. } => StatusCode::CONFLICT,
            Self::InvalidIdentifier { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ConnectionUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::QueryTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether repeating the same request later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionUnavailable { .. } | Self::QueryTimeout { .. } | Self::Storage(_)
        )
    }

    /// Stable machine-readable code for response bodies and metrics labels.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::IdentifierMissing => "TENANT_IDENTIFIER_MISSING",
            Self::NotFound { .. } => "TENANT_NOT_FOUND",
            Self::Inactive { .. } => "TENANT_INACTIVE",
            Self::ConnectionUnavailable { .. } => "CONNECTION_UNAVAILABLE",
            Self::QueryTimeout { .. } => "QUERY_TIMEOUT",
            Self::Duplicate { .. } => "DUPLICATE_TENANT",
            Self::InvalidIdentifier { .. } => "INVALID_TENANT_IDENTIFIER",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}
