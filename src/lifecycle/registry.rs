use super::{Service, ServiceLocator};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

/// Host-side service registry. Preserves registration order, which the
/// [`LifecycleManager`](super::LifecycleManager) uses as its start order.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<Vec<Arc<dyn Service>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service. A duplicate name replaces the earlier entry,
    /// keeping its position.
    pub fn register(&self, service: Arc<dyn Service>) {
        let mut services = self.services.write();
        let name = service.name().to_string();
        if let Some(existing) = services.iter_mut().find(|s| s.name() == name) {
            warn!("Replacing already-registered service '{}'", name);
            *existing = service;
        } else {
            debug!("Registered service '{}'", name);
            services.push(service);
        }
    }

    /// Remove a service by name, returning it if present
    pub fn deregister(&self, name: &str) -> Option<Arc<dyn Service>> {
        let mut services = self.services.write();
        let index = services.iter().position(|s| s.name() == name)?;
        Some(services.remove(index))
    }

    /// Snapshot of the registered services in registration order
    pub fn services(&self) -> Vec<Arc<dyn Service>> {
        self.services.read().clone()
    }

    /// Registered names in registration order
    pub fn names(&self) -> Vec<String> {
        self.services
            .read()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}

impl ServiceLocator for ServiceRegistry {
    fn lookup(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.services
            .read()
            .iter()
            .find(|s| s.name() == name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::signals::LifecycleSignals;
    use crate::error::Result;

    struct StubService {
        name: String,
        signals: LifecycleSignals,
    }

    impl StubService {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                signals: LifecycleSignals::new(),
            })
        }
    }

    impl Service for StubService {
        fn name(&self) -> &str {
            &self.name
        }
        fn is_running(&self) -> bool {
            false
        }
        fn signals(&self) -> &LifecycleSignals {
            &self.signals
        }
        fn start(&self) -> Result<bool> {
            Ok(true)
        }
        fn stop(&self) -> Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn test_lookup_by_name() {
        let registry = ServiceRegistry::new();
        registry.register(StubService::new("alpha"));
        registry.register(StubService::new("beta"));

        assert!(registry.lookup("alpha").is_some());
        assert!(registry.lookup("gamma").is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_registration_order_preserved() {
        let registry = ServiceRegistry::new();
        registry.register(StubService::new("alpha"));
        registry.register(StubService::new("beta"));
        registry.register(StubService::new("gamma"));

        assert_eq!(registry.names(), vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_duplicate_replaces_in_place() {
        let registry = ServiceRegistry::new();
        registry.register(StubService::new("alpha"));
        registry.register(StubService::new("beta"));
        registry.register(StubService::new("alpha"));

        assert_eq!(registry.names(), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_deregister() {
        let registry = ServiceRegistry::new();
        registry.register(StubService::new("alpha"));

        assert!(registry.deregister("alpha").is_some());
        assert!(registry.deregister("alpha").is_none());
        assert!(registry.is_empty());
    }
}
