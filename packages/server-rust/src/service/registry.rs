use std::any::{Any, TypeId};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{error, info};

use super::config::TenancyConfig;

// ---------------------------------------------------------------------------
// ServiceContext
// ---------------------------------------------------------------------------

/// Context provided to services during initialization.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    pub config: Arc<TenancyConfig>,
}

// ---------------------------------------------------------------------------
// ManagedService trait
// ---------------------------------------------------------------------------

/// Lifecycle-managed service trait.
///
/// Services are registered with a `ServiceRegistry`, initialized in registration
/// order, and shut down in reverse registration order. The `Any` bound enables
/// type-based lookup via `ServiceRegistry::get::<T>()`.
#[async_trait]
pub trait ManagedService: Send + Sync + Any {
    /// Returns the unique name of this service (e.g., `"connection-cache"`).
    fn name(&self) -> &'static str;

    /// Initialize the service with the given context.
    async fn init(&self, ctx: &ServiceContext) -> anyhow::Result<()>;

    /// Shut down the service. If `terminate` is true, skip graceful cleanup.
    async fn shutdown(&self, terminate: bool) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// ServiceRegistry
// ---------------------------------------------------------------------------

/// Registry for lifecycle-managed services, owned by the composition root.
///
/// Provides lookup by `name()` and by concrete type. Services are initialized
/// in registration order and shut down in reverse order.
pub struct ServiceRegistry {
    by_name: DashMap<&'static str, Arc<dyn ManagedService>>,
    by_type: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    init_order: RwLock<Vec<&'static str>>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_name: DashMap::new(),
            by_type: DashMap::new(),
            init_order: RwLock::new(Vec::new()),
        }
    }

    /// Registers a service owned by the registry.
    pub fn register<T: ManagedService>(&self, service: T) {
        self.register_shared(Arc::new(service));
    }

    /// Registers a service that is also held elsewhere (e.g. by the HTTP
    /// state). Registration order determines init/shutdown sequencing.
    pub fn register_shared<T: ManagedService>(&self, service: Arc<T>) {
        let name = service.name();
        self.by_name.insert(name, service.clone());
        self.by_type.insert(TypeId::of::<T>(), service);
        self.init_order.write().push(name);
    }

    /// Retrieve a service by its concrete type.
    pub fn get<T: ManagedService>(&self) -> Option<Arc<T>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.value().clone().downcast::<T>().ok())
    }

    /// Retrieve a service by its name.
    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn ManagedService>> {
        self.by_name.get(name).map(|entry| entry.value().clone())
    }

    /// Initialize all registered services in registration order.
    ///
    /// # Errors
    ///
    /// Returns the first `init()` failure; later services are not initialized.
    pub async fn init_all(&self, ctx: &ServiceContext) -> anyhow::Result<()> {
        let order = self.init_order.read().clone();
        for name in &order {
            if let Some(service) = self.get_by_name(name) {
                service.init(ctx).await?;
                info!(service = name, "service initialized");
            }
        }
        Ok(())
    }

    /// Shut down all registered services in reverse registration order.
    ///
    /// Every service is asked to shut down even if an earlier one fails.
    ///
    /// # Errors
    ///
    /// Returns the first `shutdown()` failure after all services were visited.
    pub async fn shutdown_all(&self, terminate: bool) -> anyhow::Result<()> {
        let order = self.init_order.read().clone();
        let mut first_error = None;
        for name in order.iter().rev() {
            if let Some(service) = self.get_by_name(name) {
                if let Err(e) = service.shutdown(terminate).await {
                    error!(service = name, error = %e, "service shutdown failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    /// Records lifecycle calls into a shared log; optionally fails shutdown.
    struct Recorder {
        svc_name: &'static str,
        log: Log,
        fail_shutdown: bool,
    }

    impl Recorder {
        fn new(svc_name: &'static str, log: &Log) -> Self {
            Self {
                svc_name,
                log: log.clone(),
                fail_shutdown: false,
            }
        }

        fn failing(svc_name: &'static str, log: &Log) -> Self {
            Self {
                fail_shutdown: true,
                ..Self::new(svc_name, log)
            }
        }
    }

    #[async_trait]
    impl ManagedService for Recorder {
        fn name(&self) -> &'static str {
            self.svc_name
        }

        async fn init(&self, _ctx: &ServiceContext) -> anyhow::Result<()> {
            self.log.lock().push(format!("init:{}", self.svc_name));
            Ok(())
        }

        async fn shutdown(&self, _terminate: bool) -> anyhow::Result<()> {
            self.log.lock().push(format!("shutdown:{}", self.svc_name));
            if self.fail_shutdown {
                anyhow::bail!("{} refused to stop", self.svc_name);
            }
            Ok(())
        }
    }

    /// A distinct service type for type-based lookup.
    struct Reaper;

    #[async_trait]
    impl ManagedService for Reaper {
        fn name(&self) -> &'static str {
            "reaper"
        }
        async fn init(&self, _ctx: &ServiceContext) -> anyhow::Result<()> {
            Ok(())
        }
        async fn shutdown(&self, _terminate: bool) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn ctx() -> ServiceContext {
        ServiceContext {
            config: Arc::new(TenancyConfig::default()),
        }
    }

    #[test]
    fn lookup_by_name_and_type() {
        let log = Log::default();
        let registry = ServiceRegistry::new();
        registry.register(Recorder::new("connection-cache", &log));
        registry.register(Reaper);

        assert_eq!(
            registry.get_by_name("connection-cache").unwrap().name(),
            "connection-cache"
        );
        assert_eq!(registry.get::<Reaper>().unwrap().name(), "reaper");
        assert!(registry.get_by_name("nonexistent").is_none());
    }

    #[test]
    fn unregistered_type_returns_none() {
        let registry = ServiceRegistry::new();
        assert!(registry.get::<Reaper>().is_none());
    }

    #[test]
    fn shared_registration_returns_same_instance() {
        let registry = ServiceRegistry::new();
        let reaper = Arc::new(Reaper);
        registry.register_shared(reaper.clone());

        let found = registry.get::<Reaper>().unwrap();
        assert!(Arc::ptr_eq(&found, &reaper));
    }

    #[tokio::test]
    async fn init_forward_shutdown_reverse() {
        let log = Log::default();
        let registry = ServiceRegistry::new();
        for name in ["registry", "cache", "reaper"] {
            registry.register(Recorder::new(name, &log));
        }

        registry.init_all(&ctx()).await.unwrap();
        registry.shutdown_all(false).await.unwrap();

        assert_eq!(
            *log.lock(),
            vec![
                "init:registry",
                "init:cache",
                "init:reaper",
                "shutdown:reaper",
                "shutdown:cache",
                "shutdown:registry",
            ]
        );
    }

    #[tokio::test]
    async fn shutdown_failure_does_not_skip_remaining_services() {
        let log = Log::default();
        let registry = ServiceRegistry::new();
        registry.register(Recorder::new("cache", &log));
        registry.register(Recorder::failing("reaper", &log));

        let err = registry.shutdown_all(false).await.unwrap_err();
        assert!(err.to_string().contains("reaper refused to stop"));
        assert_eq!(*log.lock(), vec!["shutdown:reaper", "shutdown:cache"]);
    }
}
