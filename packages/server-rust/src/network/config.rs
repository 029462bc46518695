//! Network configuration types for the `coursegate` server.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level network configuration for the server.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
    /// Allowed CORS origins.
    pub cors_origins: Vec<String>,
    /// Maximum time to wait for a request to complete.
    pub request_timeout: Duration,
    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
    /// Where tenant identifiers are read from, in priority order.
    pub resolution: ResolutionConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            tls: None,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
            max_body_bytes: 1024 * 1024,
            resolution: ResolutionConfig::default(),
        }
    }
}

/// TLS certificate configuration.
///
/// No `Default` impl because certificate paths have no sensible defaults.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file.
    pub cert_path: PathBuf,
    /// Path to the TLS private key file.
    pub key_path: PathBuf,
}

/// One place a request may carry its tenant identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantSource {
    /// A request header, e.g. `x-tenant-id`.
    Header { name: String },
    /// The first label of the `Host` header below `base_domain`
    /// (`ngo.lms.example.com` with base `lms.example.com` yields `ngo`).
    Subdomain { base_domain: String },
    /// A string claim of an HS256 bearer token signed with `secret`.
    BearerClaim { claim: String, secret: String },
}

/// Ordered tenant sources; the first one that yields an identifier wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionConfig {
    pub sources: Vec<TenantSource>,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            sources: vec![TenantSource::Header {
                name: "x-tenant-id".to_string(),
            }],
        }
    }
}
