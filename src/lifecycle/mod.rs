pub mod dependent;
pub mod manager;
pub mod registry;
pub mod signals;
pub mod ticker;

#[cfg(test)]
mod tests;

pub use dependent::DependentService;
pub use manager::{LifecycleManager, ServiceState};
pub use registry::ServiceRegistry;
pub use signals::{
    LifecycleEvent, LifecyclePhase, LifecycleSignals, SignalHub, SubscriptionHandle,
};
pub use ticker::TickerService;

use crate::error::Result;
use std::sync::Arc;

/// A component with an explicit start/stop lifecycle and four notification
/// points (see [`LifecycleSignals`]).
///
/// Contract:
/// - `start` fires [`LifecyclePhase::Starting`], performs service-specific
///   initialization, then fires [`LifecyclePhase::Started`], in that order.
///   `Started` fires at most once per start cycle. `stop` is symmetric.
/// - `Ok(true)` means the transition happened or was deferred behind a
///   dependency; `Ok(false)` means a required dependency is absent and no
///   state changed and no notifications fired.
/// - Starting an already-running service (or stopping a stopped one) is an
///   explicit no-op returning `Ok(true)`.
pub trait Service: Send + Sync {
    /// Human-readable service name, unique within a host
    fn name(&self) -> &str;

    /// True while the service is running
    fn is_running(&self) -> bool;

    /// Names of services this one waits on before completing its own
    /// transitions. Used for cycle detection.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// The four lifecycle notification hubs of this service
    fn signals(&self) -> &LifecycleSignals;

    /// Transition to running
    fn start(&self) -> Result<bool>;

    /// Transition to stopped
    fn stop(&self) -> Result<bool>;
}

/// Host capability for resolving services by name. Components receive an
/// implementation at construction rather than consulting ambient global
/// state.
pub trait ServiceLocator: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Arc<dyn Service>>;
}
