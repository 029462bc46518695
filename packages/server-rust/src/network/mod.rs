//! HTTP surface: configuration, tenant resolution, handlers, middleware,
//! and shutdown control.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod resolve;
pub mod shutdown;

pub use config::*;
pub use handlers::AppState;
pub use module::NetworkModule;
pub use resolve::TenantResolver;
pub use shutdown::*;
