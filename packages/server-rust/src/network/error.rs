//! HTTP rendering of [`TenantError`].

use axum::http::header::RETRY_AFTER;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::Json;
use coursegate_core::messages::ErrorBody;
use tracing::{debug, warn};

use crate::tenancy::TenantError;

/// Seconds a client should wait before retrying after a 503.
const RETRY_AFTER_SECS: &str = "5";

impl IntoResponse for TenantError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!(code = self.code(), error = %self, "request failed");
        } else {
            debug!(code = self.code(), error = %self, "request rejected");
        }
        metrics::counter!("coursegate_request_errors_total", "code" => self.code()).increment(1);

        let body = ErrorBody {
            error: self.to_string(),
            code: self.code().to_string(),
            retryable: self.is_retryable(),
        };
        let mut response = (status, Json(body)).into_response();
        if matches!(self, TenantError::ConnectionUnavailable { .. }) {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        }
        response
    }
}
