use super::*;
use crate::error::CaretakerError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn ticker(name: &str) -> Arc<TickerService> {
    init_tracing();
    Arc::new(TickerService::hello(name, Duration::from_millis(50)))
}

fn count_started(service: &dyn Service) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let count_clone = Arc::clone(&count);
    service.signals().started().subscribe(move |_| {
        count_clone.fetch_add(1, Ordering::SeqCst);
    });
    count
}

#[test]
fn test_dependent_start_with_peer_absent() {
    // Scenario A: peer not registered; start refuses, no notifications
    let registry = Arc::new(ServiceRegistry::new());
    let dependent = Arc::new(DependentService::new(
        "chained",
        "hello",
        Arc::clone(&registry) as Arc<dyn ServiceLocator>,
    ));
    registry.register(Arc::clone(&dependent) as Arc<dyn Service>);

    let started = count_started(dependent.as_ref());

    assert!(!dependent.start().unwrap());
    assert!(!dependent.is_running());
    assert_eq!(started.load(Ordering::SeqCst), 0);
}

#[test]
fn test_dependent_start_deferred_until_peer_starts() {
    // Scenario B: peer registered but not running; dependent's Started fires
    // only after the peer's Started
    let registry = Arc::new(ServiceRegistry::new());
    let hello = ticker("hello");
    let dependent = Arc::new(DependentService::new(
        "chained",
        "hello",
        Arc::clone(&registry) as Arc<dyn ServiceLocator>,
    ));
    registry.register(Arc::clone(&hello) as Arc<dyn Service>);
    registry.register(Arc::clone(&dependent) as Arc<dyn Service>);

    let order = Arc::new(Mutex::new(Vec::new()));
    for service in registry.services() {
        let order_clone = Arc::clone(&order);
        service.signals().started().subscribe(move |event| {
            order_clone.lock().push(event.service.clone());
        });
    }

    assert!(dependent.start().unwrap());
    assert!(!dependent.is_running());
    assert!(order.lock().is_empty());

    assert!(hello.start().unwrap());
    assert!(dependent.is_running());
    assert_eq!(*order.lock(), vec!["hello".to_string(), "chained".to_string()]);

    hello.stop().unwrap();
}

#[test]
fn test_dependent_start_synchronous_when_peer_running() {
    let registry = Arc::new(ServiceRegistry::new());
    let hello = ticker("hello");
    let dependent = Arc::new(DependentService::new(
        "chained",
        "hello",
        Arc::clone(&registry) as Arc<dyn ServiceLocator>,
    ));
    registry.register(Arc::clone(&hello) as Arc<dyn Service>);
    registry.register(Arc::clone(&dependent) as Arc<dyn Service>);

    hello.start().unwrap();
    let started = count_started(dependent.as_ref());

    // Dependency already satisfied: Started fires before start() returns
    assert!(dependent.start().unwrap());
    assert!(dependent.is_running());
    assert_eq!(started.load(Ordering::SeqCst), 1);

    hello.stop().unwrap();
}

#[test]
fn test_dependent_started_fires_exactly_once_per_cycle() {
    let registry = Arc::new(ServiceRegistry::new());
    let hello = ticker("hello");
    let dependent = Arc::new(DependentService::new(
        "chained",
        "hello",
        Arc::clone(&registry) as Arc<dyn ServiceLocator>,
    ));
    registry.register(Arc::clone(&hello) as Arc<dyn Service>);
    registry.register(Arc::clone(&dependent) as Arc<dyn Service>);

    let started = count_started(dependent.as_ref());

    dependent.start().unwrap();
    // A second start while deferred registers nothing extra
    dependent.start().unwrap();
    hello.start().unwrap();

    assert_eq!(started.load(Ordering::SeqCst), 1);

    // Restarting the peer must not re-fire the dependent's Started
    hello.stop().unwrap();
    dependent.stop().unwrap();
    hello.start().unwrap();
    assert_eq!(started.load(Ordering::SeqCst), 1);

    hello.stop().unwrap();
}

#[test]
fn test_dependent_stop_deferred_until_peer_stops() {
    let registry = Arc::new(ServiceRegistry::new());
    let hello = ticker("hello");
    let dependent = Arc::new(DependentService::new(
        "chained",
        "hello",
        Arc::clone(&registry) as Arc<dyn ServiceLocator>,
    ));
    registry.register(Arc::clone(&hello) as Arc<dyn Service>);
    registry.register(Arc::clone(&dependent) as Arc<dyn Service>);

    hello.start().unwrap();
    dependent.start().unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    for service in registry.services() {
        let order_clone = Arc::clone(&order);
        service.signals().stopped().subscribe(move |event| {
            order_clone.lock().push(event.service.clone());
        });
    }

    // Stop ordering policy: the peer finishes stopping first
    assert!(dependent.stop().unwrap());
    assert!(dependent.is_running());
    assert!(order.lock().is_empty());

    hello.stop().unwrap();
    assert!(!dependent.is_running());
    assert_eq!(*order.lock(), vec!["hello".to_string(), "chained".to_string()]);
}

#[test]
fn test_dependent_stop_synchronous_when_peer_stopped() {
    let registry = Arc::new(ServiceRegistry::new());
    let hello = ticker("hello");
    let dependent = Arc::new(DependentService::new(
        "chained",
        "hello",
        Arc::clone(&registry) as Arc<dyn ServiceLocator>,
    ));
    registry.register(Arc::clone(&hello) as Arc<dyn Service>);
    registry.register(Arc::clone(&dependent) as Arc<dyn Service>);

    hello.start().unwrap();
    dependent.start().unwrap();

    // Peer goes down first on its own; the dependent's stop then completes
    // synchronously
    hello.stop().unwrap();
    assert!(dependent.is_running());

    let stopped = Arc::new(AtomicUsize::new(0));
    let stopped_clone = Arc::clone(&stopped);
    dependent.signals().stopped().subscribe(move |_| {
        stopped_clone.fetch_add(1, Ordering::SeqCst);
    });

    assert!(dependent.stop().unwrap());
    assert!(!dependent.is_running());
    assert_eq!(stopped.load(Ordering::SeqCst), 1);
}

#[test]
fn test_stop_during_peer_start_dispatch_abandons_deferral() {
    let registry = Arc::new(ServiceRegistry::new());
    let hello = ticker("hello");
    let dependent = Arc::new(DependentService::new(
        "chained",
        "hello",
        Arc::clone(&registry) as Arc<dyn ServiceLocator>,
    ));
    registry.register(Arc::clone(&hello) as Arc<dyn Service>);
    registry.register(Arc::clone(&dependent) as Arc<dyn Service>);

    // This listener runs ahead of the deferred one-shot in the same dispatch
    // and stops the dependent while the peer's Started is mid-delivery
    let dependent_clone = Arc::clone(&dependent);
    hello.signals().started().subscribe(move |_| {
        dependent_clone.stop().unwrap();
    });

    dependent.start().unwrap();
    hello.start().unwrap();

    // The one-shot was already snapshotted when the stop abandoned it; it
    // must not start the service anyway
    assert!(!dependent.is_running());

    hello.stop().unwrap();
}

#[test]
fn test_abandoned_deferred_start_never_fires() {
    let registry = Arc::new(ServiceRegistry::new());
    let hello = ticker("hello");
    let dependent = Arc::new(DependentService::new(
        "chained",
        "hello",
        Arc::clone(&registry) as Arc<dyn ServiceLocator>,
    ));
    registry.register(Arc::clone(&hello) as Arc<dyn Service>);
    registry.register(Arc::clone(&dependent) as Arc<dyn Service>);

    let started = count_started(dependent.as_ref());

    dependent.start().unwrap();
    assert_eq!(hello.signals().started().subscriber_count(), 1);

    // Stopping before the peer ever starts abandons the pending one-shot
    dependent.stop().unwrap();
    assert_eq!(hello.signals().started().subscriber_count(), 0);

    hello.start().unwrap();
    assert!(!dependent.is_running());
    assert_eq!(started.load(Ordering::SeqCst), 0);

    hello.stop().unwrap();
}

#[test]
fn test_repeated_cycles_leak_no_subscriptions() {
    let registry = Arc::new(ServiceRegistry::new());
    let hello = ticker("hello");
    let dependent = Arc::new(DependentService::new(
        "chained",
        "hello",
        Arc::clone(&registry) as Arc<dyn ServiceLocator>,
    ));
    registry.register(Arc::clone(&hello) as Arc<dyn Service>);
    registry.register(Arc::clone(&dependent) as Arc<dyn Service>);

    for _ in 0..5 {
        dependent.start().unwrap();
        hello.start().unwrap();
        dependent.stop().unwrap();
        hello.stop().unwrap();
    }

    assert_eq!(hello.signals().started().subscriber_count(), 0);
    assert_eq!(hello.signals().stopped().subscriber_count(), 0);
}

#[test]
fn test_cyclic_dependency_detected() {
    let registry = Arc::new(ServiceRegistry::new());
    let a = Arc::new(DependentService::new(
        "a",
        "b",
        Arc::clone(&registry) as Arc<dyn ServiceLocator>,
    ));
    let b = Arc::new(DependentService::new(
        "b",
        "a",
        Arc::clone(&registry) as Arc<dyn ServiceLocator>,
    ));
    registry.register(Arc::clone(&a) as Arc<dyn Service>);
    registry.register(Arc::clone(&b) as Arc<dyn Service>);

    match a.start() {
        Err(CaretakerError::DependencyCycle { path }) => {
            assert!(path.contains("a"));
            assert!(path.contains("b"));
        }
        other => panic!("Expected DependencyCycle, got {:?}", other.map(|_| ())),
    }
    assert!(!a.is_running());
}

#[test]
fn test_self_dependency_detected() {
    let registry = Arc::new(ServiceRegistry::new());
    let narcissus = Arc::new(DependentService::new(
        "narcissus",
        "narcissus",
        Arc::clone(&registry) as Arc<dyn ServiceLocator>,
    ));
    registry.register(Arc::clone(&narcissus) as Arc<dyn Service>);

    assert!(matches!(
        narcissus.start(),
        Err(CaretakerError::DependencyCycle { .. })
    ));
}

#[test]
fn test_manager_drives_fleet_in_order() {
    let registry = Arc::new(ServiceRegistry::new());
    let hello = ticker("hello");
    let dependent = Arc::new(DependentService::new(
        "chained",
        "hello",
        Arc::clone(&registry) as Arc<dyn ServiceLocator>,
    ));
    registry.register(Arc::clone(&hello) as Arc<dyn Service>);
    registry.register(Arc::clone(&dependent) as Arc<dyn Service>);

    let manager = LifecycleManager::new(Arc::clone(&registry));
    manager.start_all().unwrap();

    assert_eq!(manager.state("hello"), Some(ServiceState::Running));
    assert_eq!(manager.state("chained"), Some(ServiceState::Running));
    assert!(hello.is_running());
    assert!(dependent.is_running());

    // Reverse order: the dependent's stop defers on the peer, which stops
    // right after it, completing both
    manager.stop_all().unwrap();
    assert_eq!(manager.state("hello"), Some(ServiceState::Stopped));
    assert_eq!(manager.state("chained"), Some(ServiceState::Stopped));
    assert!(!hello.is_running());
    assert!(!dependent.is_running());
}

#[test]
fn test_manager_watches_services_registered_later() {
    let registry = Arc::new(ServiceRegistry::new());
    let hello = ticker("hello");
    registry.register(Arc::clone(&hello) as Arc<dyn Service>);

    let manager = LifecycleManager::new(Arc::clone(&registry));
    manager.start_all().unwrap();

    // Registered after the first round; the next round must pick it up
    let late = ticker("late");
    registry.register(Arc::clone(&late) as Arc<dyn Service>);
    manager.start_all().unwrap();
    assert_eq!(manager.state("late"), Some(ServiceState::Running));

    // Stopped outside the manager: only the watcher can reflect this
    late.stop().unwrap();
    assert_eq!(manager.state("late"), Some(ServiceState::Stopped));

    manager.stop_all().unwrap();
}

#[test]
fn test_manager_logs_slow_stop_and_still_completes() {
    struct SluggishService {
        signals: LifecycleSignals,
        running: std::sync::atomic::AtomicBool,
    }

    impl Service for SluggishService {
        fn name(&self) -> &str {
            "sluggish"
        }
        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }
        fn signals(&self) -> &LifecycleSignals {
            &self.signals
        }
        fn start(&self) -> crate::error::Result<bool> {
            self.signals.emit("sluggish", LifecyclePhase::Starting);
            self.running.store(true, Ordering::SeqCst);
            self.signals.emit("sluggish", LifecyclePhase::Started);
            Ok(true)
        }
        fn stop(&self) -> crate::error::Result<bool> {
            self.signals.emit("sluggish", LifecyclePhase::Stopping);
            std::thread::sleep(Duration::from_millis(20));
            self.running.store(false, Ordering::SeqCst);
            self.signals.emit("sluggish", LifecyclePhase::Stopped);
            Ok(true)
        }
    }

    init_tracing();
    let registry = Arc::new(ServiceRegistry::new());
    registry.register(Arc::new(SluggishService {
        signals: LifecycleSignals::new(),
        running: std::sync::atomic::AtomicBool::new(false),
    }) as Arc<dyn Service>);

    let manager =
        LifecycleManager::new(Arc::clone(&registry)).with_stop_grace(Duration::from_millis(1));
    manager.start_all().unwrap();
    assert_eq!(manager.state("sluggish"), Some(ServiceState::Running));

    // Exceeding the grace is logged, never an error
    manager.stop_all().unwrap();
    assert_eq!(manager.state("sluggish"), Some(ServiceState::Stopped));
}

#[test]
fn test_manager_marks_missing_dependency_failed() {
    let registry = Arc::new(ServiceRegistry::new());
    let orphan = Arc::new(DependentService::new(
        "orphan",
        "missing",
        Arc::clone(&registry) as Arc<dyn ServiceLocator>,
    ));
    registry.register(Arc::clone(&orphan) as Arc<dyn Service>);

    let manager = LifecycleManager::new(Arc::clone(&registry));
    manager.start_all().unwrap();

    assert_eq!(manager.state("orphan"), Some(ServiceState::Failed));
    assert!(!orphan.is_running());
}
