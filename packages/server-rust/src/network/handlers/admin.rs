//! Administrative endpoints: tenant switching, connection introspection,
//! and tenant management.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use coursegate_core::messages::{
    ActiveConnection, CreateTenantRequest, SetStatusRequest, SwitchTenantRequest,
    SwitchTenantResponse, UpdateTenantRequest,
};
use coursegate_core::TenantRecord;

use super::AppState;
use crate::tenancy::TenantError;

/// `POST /admin/tenants/switch`. Always 200; the body reports the outcome.
pub async fn switch_tenant_handler(
    State(state): State<AppState>,
    Json(request): Json<SwitchTenantRequest>,
) -> Json<SwitchTenantResponse> {
    Json(state.admin.switch_to(&request.tenant_id).await)
}

/// `GET /admin/connections`.
pub async fn list_connections_handler(State(state): State<AppState>) -> Json<Vec<ActiveConnection>> {
    Json(state.admin.list_active())
}

/// `DELETE /admin/connections/{tenant_id}`: 204 if a connection was
/// evicted, 404 if none was cached.
pub async fn evict_connection_handler(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> StatusCode {
    if state.admin.evict(&tenant_id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// `GET /admin/tenants`.
pub async fn list_tenants_handler(State(state): State<AppState>) -> Json<Vec<TenantRecord>> {
    Json(state.admin.list_tenants())
}

/// `POST /admin/tenants`: 201 with the created record.
pub async fn create_tenant_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateTenantRequest>,
) -> Result<(StatusCode, Json<TenantRecord>), TenantError> {
    let record = state.admin.create_tenant(request).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// `PATCH /admin/tenants/{tenant_id}`.
pub async fn update_tenant_handler(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(request): Json<UpdateTenantRequest>,
) -> Result<Json<TenantRecord>, TenantError> {
    state
        .admin
        .update_tenant(&tenant_id, request)
        .await
        .map(Json)
}

/// `PUT /admin/tenants/{tenant_id}/status`.
pub async fn set_status_handler(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(request): Json<SetStatusRequest>,
) -> Result<Json<TenantRecord>, TenantError> {
    state
        .admin
        .set_status(&tenant_id, request.status)
        .await
        .map(Json)
}

#[cfg(test)]
mod tests {
    use coursegate_core::{ReadinessState, TenantStatus};

    use super::*;
    use crate::network::handlers::test_support::app_state;

    #[tokio::test]
    async fn switch_then_list_shows_one_ready_entry() {
        let (state, _fixture) = app_state(&["ngo"]).await;
        let response = switch_tenant_handler(
            State(state.clone()),
            Json(SwitchTenantRequest {
                tenant_id: "ngo".to_string(),
            }),
        )
        .await;
        assert!(response.0.success);

        let rows = list_connections_handler(State(state)).await.0;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].state, ReadinessState::Ready);
    }

    #[tokio::test]
    async fn evict_reports_absence() {
        let (state, fixture) = app_state(&["ngo"]).await;
        fixture.cache.acquire("ngo").await.unwrap();

        let path = || Path("ngo".to_string());
        assert_eq!(
            evict_connection_handler(State(state.clone()), path()).await,
            StatusCode::NO_CONTENT
        );
        assert_eq!(
            evict_connection_handler(State(state), path()).await,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn duplicate_create_is_an_error() {
        let (state, _fixture) = app_state(&["ngo"]).await;
        let err = create_tenant_handler(
            State(state),
            Json(CreateTenantRequest {
                tenant_id: Some("ngo".to_string()),
                display_name: "Another NGO".to_string(),
                ..CreateTenantRequest::default()
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TenantError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn set_status_returns_updated_record() {
        let (state, _fixture) = app_state(&["ngo"]).await;
        let record = set_status_handler(
            State(state),
            Path("ngo".to_string()),
            Json(SetStatusRequest {
                status: TenantStatus::Suspended,
            }),
        )
        .await
        .unwrap()
        .0;
        assert_eq!(record.status, TenantStatus::Suspended);
    }
}
