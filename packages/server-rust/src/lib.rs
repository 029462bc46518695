//! `coursegate` server: per-tenant connection management for a multi-tenant LMS.

pub mod network;
pub mod service;
pub mod storage;
pub mod tenancy;
pub mod traits;

pub use traits::{ConnectionFactory, ConnectionId, TenantConnection, TenantStore};
