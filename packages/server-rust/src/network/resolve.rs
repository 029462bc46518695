//! Tenant resolution: identifier extraction and the per-request middleware.
//!
//! Every `/api` request passes through [`resolve_tenant`], which reads the
//! tenant identifier from the configured sources, acquires the tenant's ready
//! connection, and attaches a [`TenantScope`] to the request extensions.
//! Failures end the request before any handler runs.

use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, HOST};
use axum::http::{HeaderMap, HeaderName};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use coursegate_core::RequestContext;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use tracing::{debug, Instrument};

use super::config::{ResolutionConfig, TenantSource};
use super::handlers::AppState;
use crate::tenancy::{TenantError, TenantScope};

enum Source {
    Header(HeaderName),
    Subdomain(String),
    BearerClaim {
        claim: String,
        key: DecodingKey,
        validation: Validation,
    },
}

impl Source {
    fn kind(&self) -> &'static str {
        match self {
            Self::Header(_) => "header",
            Self::Subdomain(_) => "subdomain",
            Self::BearerClaim { .. } => "bearer-claim",
        }
    }

    fn extract(&self, headers: &HeaderMap) -> Option<String> {
        match self {
            Self::Header(name) => headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            Self::Subdomain(base) => {
                let host = headers.get(HOST)?.to_str().ok()?;
                subdomain_of(host, base)
            }
            Self::BearerClaim {
                claim,
                key,
                validation,
            } => {
                let token = headers
                    .get(AUTHORIZATION)?
                    .to_str()
                    .ok()?
                    .strip_prefix("Bearer ")?
                    .trim();
                match decode::<Value>(token, key, validation) {
                    Ok(data) => data
                        .claims
                        .get(claim.as_str())
                        .and_then(Value::as_str)
                        .filter(|v| !v.is_empty())
                        .map(str::to_string),
                    Err(e) => {
                        debug!(error = %e, "bearer token rejected for tenant resolution");
                        None
                    }
                }
            }
        }
    }
}

/// Leftmost label of `host` (port stripped) directly below `base`.
fn subdomain_of(host: &str, base: &str) -> Option<String> {
    let host = host.split(':').next().unwrap_or(host).to_ascii_lowercase();
    let label = host.strip_suffix(base)?.strip_suffix('.')?;
    (!label.is_empty() && !label.contains('.')).then(|| label.to_string())
}

/// Extracts tenant identifiers from request headers.
pub struct TenantResolver {
    sources: Vec<Source>,
}

impl TenantResolver {
    /// Compiles the configured sources.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid header name, an empty source list, or
    /// a bearer-claim source without a secret.
    pub fn new(config: &ResolutionConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(
            !config.sources.is_empty(),
            "at least one tenant source is required"
        );
        let mut sources = Vec::with_capacity(config.sources.len());
        for source in &config.sources {
            sources.push(match source {
                TenantSource::Header { name } => {
                    Source::Header(HeaderName::from_bytes(name.to_ascii_lowercase().as_bytes())?)
                }
                TenantSource::Subdomain { base_domain } => Source::Subdomain(
                    base_domain.trim_matches('.').to_ascii_lowercase(),
                ),
                TenantSource::BearerClaim { claim, secret } => {
                    anyhow::ensure!(!secret.is_empty(), "bearer-claim source needs a secret");
                    Source::BearerClaim {
                        claim: claim.clone(),
                        key: DecodingKey::from_secret(secret.as_bytes()),
                        validation: Validation::new(Algorithm::HS256),
                    }
                }
            });
        }
        Ok(Self { sources })
    }

    /// Returns the identifier from the first source that yields one.
    ///
    /// # Errors
    ///
    /// [`TenantError::IdentifierMissing`] when no source yields an identifier.
    pub fn identify(&self, headers: &HeaderMap) -> Result<String, TenantError> {
        self.sources
            .iter()
            .find_map(|source| {
                let found = source.extract(headers);
                if found.is_some() {
                    debug!(source = source.kind(), "tenant identifier resolved");
                }
                found
            })
            .ok_or(TenantError::IdentifierMissing)
    }
}

/// Resolution middleware for tenant-scoped routes.
pub async fn resolve_tenant(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);

    let scope = match attach_scope(&state, request.headers(), request_id).await {
        Ok(scope) => scope,
        Err(e) => return e.into_response(),
    };

    let span = tracing::info_span!(
        "tenant",
        tenant_id = %scope.tenant_id(),
        request_id = %scope.context().request_id,
    );
    request.extensions_mut().insert(scope);
    next.run(request).instrument(span).await
}

async fn attach_scope(
    state: &AppState,
    headers: &HeaderMap,
    request_id: String,
) -> Result<TenantScope, TenantError> {
    let raw = state.resolver.identify(headers)?;
    let record = state.cache.registry().lookup_active(&raw)?;
    let connection = state.cache.acquire(record.tenant_id.as_str()).await?;
    Ok(TenantScope::new(
        RequestContext::new(record.tenant_id, request_id),
        connection,
        state.cache.clone(),
        state.deadline,
    ))
}
