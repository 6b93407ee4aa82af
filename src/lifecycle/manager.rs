use super::registry::ServiceRegistry;
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Manager-side view of a service's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// Drives a fleet of services: starts them in registration order, stops them
/// in reverse, and tracks a per-service [`ServiceState`].
///
/// A service that refuses to start (missing dependency) or returns an error
/// is marked `Failed` and logged; the remaining services are still driven.
pub struct LifecycleManager {
    registry: Arc<ServiceRegistry>,
    states: Arc<Mutex<HashMap<String, ServiceState>>>,
    /// A stop taking longer than this is logged as slow
    stop_grace: Duration,
}

impl LifecycleManager {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self {
            registry,
            states: Arc::new(Mutex::new(HashMap::new())),
            stop_grace: Duration::from_millis(5000),
        }
    }

    /// Set the slow-stop threshold, typically from
    /// [`CaretakerConfig::stop_grace`](crate::config::CaretakerConfig::stop_grace)
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Record every not-yet-seen service as stopped and watch its lifecycle
    /// notifications, so deferred transitions (the dependent-service pattern)
    /// are reflected in the state map when they eventually complete. Runs on
    /// every `start_all`, so services registered after an earlier round are
    /// picked up too.
    pub fn initialize(&self) {
        let mut states = self.states.lock();
        let mut added = 0usize;
        for service in self.registry.services() {
            let name = service.name().to_string();
            if states.contains_key(&name) {
                continue;
            }
            states.insert(name.clone(), ServiceState::Stopped);
            added += 1;

            let states_started = Arc::clone(&self.states);
            let started_name = name.clone();
            service.signals().started().subscribe(move |_| {
                states_started
                    .lock()
                    .insert(started_name.clone(), ServiceState::Running);
            });

            let states_stopped = Arc::clone(&self.states);
            service.signals().stopped().subscribe(move |_| {
                states_stopped
                    .lock()
                    .insert(name.clone(), ServiceState::Stopped);
            });
        }

        if added > 0 {
            info!("Lifecycle manager now watching {} service(s)", states.len());
        }
    }

    /// Start all services in registration order. A failing service does not
    /// prevent the rest from starting.
    pub fn start_all(&self) -> Result<()> {
        self.initialize();
        info!("Starting {} service(s)", self.registry.len());

        for service in self.registry.services() {
            let name = service.name().to_string();
            self.set_state(&name, ServiceState::Starting);

            match service.start() {
                Ok(true) => {
                    if service.is_running() {
                        self.set_state(&name, ServiceState::Running);
                        info!("Service '{}' started", name);
                    } else {
                        // Deferred; the Started watcher flips it to Running
                        info!("Service '{}' start deferred", name);
                    }
                }
                Ok(false) => {
                    self.set_state(&name, ServiceState::Failed);
                    warn!("Service '{}' refused to start (missing dependency)", name);
                }
                Err(e) => {
                    self.set_state(&name, ServiceState::Failed);
                    error!("Service '{}' failed to start: {}", name, e);
                }
            }
        }

        Ok(())
    }

    /// Stop all services in reverse registration order
    pub fn stop_all(&self) -> Result<()> {
        info!("Stopping {} service(s)", self.registry.len());

        for service in self.registry.services().into_iter().rev() {
            let name = service.name().to_string();
            if self.state(&name) == Some(ServiceState::Stopped) {
                continue;
            }
            self.set_state(&name, ServiceState::Stopping);

            let begun = Instant::now();
            match service.stop() {
                Ok(true) => {
                    if !service.is_running() {
                        self.set_state(&name, ServiceState::Stopped);
                        info!("Service '{}' stopped", name);
                    } else {
                        info!("Service '{}' stop deferred", name);
                    }
                }
                Ok(false) => {
                    self.set_state(&name, ServiceState::Failed);
                    warn!("Service '{}' refused to stop", name);
                }
                Err(e) => {
                    self.set_state(&name, ServiceState::Failed);
                    error!("Service '{}' failed to stop: {}", name, e);
                }
            }

            let elapsed = begun.elapsed();
            if elapsed > self.stop_grace {
                warn!(
                    "Service '{}' took {:?} to stop (grace {:?})",
                    name, elapsed, self.stop_grace
                );
            }
        }

        Ok(())
    }

    pub fn state(&self, name: &str) -> Option<ServiceState> {
        self.states.lock().get(name).copied()
    }

    pub fn states(&self) -> HashMap<String, ServiceState> {
        self.states.lock().clone()
    }

    fn set_state(&self, name: &str, state: ServiceState) {
        self.states.lock().insert(name.to_string(), state);
    }
}
