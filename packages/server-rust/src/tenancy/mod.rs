//! Tenant connection management.
//!
//! - [`registry`]: tenant metadata and status
//! - [`cache`]: one lazily created connection per tenant
//! - [`deadline`]: bounded-time storage operations and the request scope
//! - [`admin`]: operator switching and introspection
//! - [`reaper`]: idle eviction and health probing in the background

pub mod admin;
pub mod cache;
pub mod deadline;
pub mod entry;
pub mod error;
pub mod reaper;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use admin::AdminSurface;
pub use cache::{CacheConfig, ConnectionCache};
pub use deadline::{QueryDeadline, TenantScope};
pub use entry::ConnectionEntry;
pub use error::TenantError;
pub use reaper::{IdleReaper, MaintenanceTask};
pub use registry::TenantRegistry;
