use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error};

/// The four notification points of a service lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecyclePhase {
    /// Fired before the service's own startup logic runs
    Starting,
    /// Fired after the service's own startup logic completes
    Started,
    /// Fired before the service's own teardown logic runs
    Stopping,
    /// Fired after the service's own teardown logic completes
    Stopped,
}

impl LifecyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::Starting => "starting",
            LifecyclePhase::Started => "started",
            LifecyclePhase::Stopping => "stopping",
            LifecyclePhase::Stopped => "stopped",
        }
    }
}

/// A lifecycle notification delivered to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub service: String,
    pub phase: LifecyclePhase,
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn new<S: Into<String>>(service: S, phase: LifecyclePhase) -> Self {
        Self {
            service: service.into(),
            phase,
            timestamp: Utc::now(),
        }
    }
}

type Callback = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

struct Subscriber {
    id: u64,
    once: bool,
    callback: Callback,
}

#[derive(Default)]
struct HubInner {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

/// Handle to a single registration on a [`SignalHub`]. Dropping the handle
/// does not unsubscribe; call [`SubscriptionHandle::cancel`] to remove the
/// listener before it fires.
pub struct SubscriptionHandle {
    hub: Weak<HubInner>,
    id: u64,
}

impl SubscriptionHandle {
    /// Remove the registration. No-op if the listener already fired (one-shot)
    /// or the hub is gone.
    pub fn cancel(&self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.subscribers.lock().retain(|s| s.id != self.id);
        }
    }

    /// True while the registration is still present on the hub
    pub fn is_active(&self) -> bool {
        match self.hub.upgrade() {
            Some(hub) => hub.subscribers.lock().iter().any(|s| s.id == self.id),
            None => false,
        }
    }
}

/// Multicast dispatch point for one lifecycle phase.
///
/// Dispatch is fire-and-continue: every subscriber is invoked under
/// `catch_unwind`, so a panicking listener is logged and skipped without
/// aborting the emitting service's transition or later listeners. Callbacks
/// are cloned out of the lock before invocation, so a listener may re-enter
/// `subscribe` or trigger another service's `start`/`stop` (the chained
/// service pattern) without deadlocking.
pub struct SignalHub {
    inner: Arc<HubInner>,
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner::default()),
        }
    }

    /// Register a persistent listener
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.register(callback, false)
    }

    /// Register a one-shot listener, removed from the hub before it fires.
    /// One-shot listeners never fire twice and never survive into the next
    /// start/stop cycle.
    pub fn subscribe_once<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.register(callback, true)
    }

    fn register<F>(&self, callback: F, once: bool) -> SubscriptionHandle
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().push(Subscriber {
            id,
            once,
            callback: Arc::new(callback),
        });
        SubscriptionHandle {
            hub: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Deliver an event to every current subscriber
    pub fn emit(&self, event: &LifecycleEvent) {
        let callbacks: Vec<Callback> = {
            let mut subscribers = self.inner.subscribers.lock();
            let callbacks = subscribers
                .iter()
                .map(|s| Arc::clone(&s.callback))
                .collect();
            subscribers.retain(|s| !s.once);
            callbacks
        };

        debug!(
            "Dispatching {} '{}' to {} subscriber(s)",
            event.service,
            event.phase.as_str(),
            callbacks.len()
        );

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                error!(
                    "Lifecycle subscriber panicked during {} '{}'; continuing with remaining subscribers",
                    event.service,
                    event.phase.as_str()
                );
            }
        }
    }

    /// Number of currently registered listeners
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

/// The four notification hubs owned by every service
#[derive(Default)]
pub struct LifecycleSignals {
    starting: SignalHub,
    started: SignalHub,
    stopping: SignalHub,
    stopped: SignalHub,
}

impl LifecycleSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hub(&self, phase: LifecyclePhase) -> &SignalHub {
        match phase {
            LifecyclePhase::Starting => &self.starting,
            LifecyclePhase::Started => &self.started,
            LifecyclePhase::Stopping => &self.stopping,
            LifecyclePhase::Stopped => &self.stopped,
        }
    }

    pub fn starting(&self) -> &SignalHub {
        &self.starting
    }

    pub fn started(&self) -> &SignalHub {
        &self.started
    }

    pub fn stopping(&self) -> &SignalHub {
        &self.stopping
    }

    pub fn stopped(&self) -> &SignalHub {
        &self.stopped
    }

    /// Emit a phase notification on behalf of the named service
    pub fn emit(&self, service: &str, phase: LifecyclePhase) {
        self.hub(phase)
            .emit(&LifecycleEvent::new(service, phase));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_subscribe_and_emit() {
        let hub = SignalHub::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let fired_clone = Arc::clone(&fired);
        let _handle = hub.subscribe(move |_| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        hub.emit(&LifecycleEvent::new("svc", LifecyclePhase::Started));
        hub.emit(&LifecycleEvent::new("svc", LifecyclePhase::Started));

        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[test]
    fn test_one_shot_fires_exactly_once() {
        let hub = SignalHub::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let fired_clone = Arc::clone(&fired);
        let handle = hub.subscribe_once(move |_| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        hub.emit(&LifecycleEvent::new("svc", LifecyclePhase::Started));
        hub.emit(&LifecycleEvent::new("svc", LifecyclePhase::Started));

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(hub.subscriber_count(), 0);
        assert!(!handle.is_active());
    }

    #[test]
    fn test_cancelled_subscription_never_fires() {
        let hub = SignalHub::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let fired_clone = Arc::clone(&fired);
        let handle = hub.subscribe_once(move |_| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handle.is_active());
        handle.cancel();
        assert!(!handle.is_active());

        hub.emit(&LifecycleEvent::new("svc", LifecyclePhase::Started));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_subscriber_does_not_break_others() {
        let hub = SignalHub::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let _bad = hub.subscribe(|_| {
            panic!("broken listener");
        });
        let fired_clone = Arc::clone(&fired);
        let _good = hub.subscribe(move |_| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        hub.emit(&LifecycleEvent::new("svc", LifecyclePhase::Started));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscriber_may_reenter_hub() {
        let hub = Arc::new(SignalHub::new());
        let fired = Arc::new(AtomicUsize::new(0));

        let hub_clone = Arc::clone(&hub);
        let fired_clone = Arc::clone(&fired);
        let _outer = hub.subscribe(move |_| {
            // Subscribing from inside a callback must not deadlock
            let fired_inner = Arc::clone(&fired_clone);
            hub_clone.subscribe_once(move |_| {
                fired_inner.fetch_add(1, Ordering::SeqCst);
            });
        });

        hub.emit(&LifecycleEvent::new("svc", LifecyclePhase::Started));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        hub.emit(&LifecycleEvent::new("svc", LifecyclePhase::Started));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_serialization() {
        let event = LifecycleEvent::new("ticker", LifecyclePhase::Stopped);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"ticker\""));
        assert!(json.contains("Stopped"));
    }
}
