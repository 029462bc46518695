//! Concrete storage backend implementations.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "redb")]
pub mod redb;

pub use memory::{MemoryConnection, MemoryConnectionFactory, MemoryTenantStore};
#[cfg(feature = "postgres")]
pub use postgres::{PgConnection, PgConnectionFactory, PgTenantStore};
#[cfg(feature = "redb")]
pub use self::redb::{RedbConnection, RedbConnectionFactory, RedbTenantStore};
