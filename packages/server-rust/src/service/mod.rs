//! Service lifecycle and background work.
//!
//! 1. **Configuration** (`config`): tenancy deadlines and maintenance cadence
//! 2. **Registry** (`registry`): `ManagedService` lifecycle, init in order and
//!    shutdown in reverse
//! 3. **Background workers** (`worker`): periodic and on-demand tasks

pub mod config;
pub mod registry;
pub mod worker;

pub use config::TenancyConfig;
pub use registry::{ManagedService, ServiceContext, ServiceRegistry};
pub use worker::{BackgroundRunnable, BackgroundWorker};
