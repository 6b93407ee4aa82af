use super::signals::{LifecyclePhase, LifecycleSignals, SubscriptionHandle};
use super::{Service, ServiceLocator};
use crate::error::{CaretakerError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

struct Pending {
    handle: Option<SubscriptionHandle>,
    /// Bumped whenever a deferral is abandoned. A one-shot callback captures
    /// the generation it was registered under and completes only if it still
    /// matches: cancelling the handle is not enough once the peer's dispatch
    /// has already snapshotted the callback.
    generation: u64,
}

struct Inner {
    name: String,
    peer: String,
    running: AtomicBool,
    signals: LifecycleSignals,
    /// One-shot registration on the peer, if a transition is deferred.
    /// Cancelled whenever a new transition is requested, so repeated
    /// start/stop cycles cannot leak subscriptions.
    pending: Mutex<Pending>,
}

impl Inner {
    /// Run this service's own startup logic, bracketed by Starting/Started.
    /// Guarded so a late one-shot cannot start the service twice.
    fn complete_start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("'{}' starting now that '{}' is up", self.name, self.peer);
        self.signals.emit(&self.name, LifecyclePhase::Starting);
        self.signals.emit(&self.name, LifecyclePhase::Started);
    }

    /// Run this service's own teardown logic, bracketed by Stopping/Stopped
    fn complete_stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("'{}' stopping now that '{}' is down", self.name, self.peer);
        self.signals.emit(&self.name, LifecyclePhase::Stopping);
        self.signals.emit(&self.name, LifecyclePhase::Stopped);
    }

    fn clear_pending(&self) {
        let mut pending = self.pending.lock();
        pending.generation += 1;
        if let Some(handle) = pending.handle.take() {
            handle.cancel();
        }
    }

    /// Complete a deferred transition from a one-shot callback, unless the
    /// deferral was abandoned after the callback was snapshotted for dispatch
    fn complete_deferred(&self, generation: u64, start: bool) {
        {
            let mut pending = self.pending.lock();
            if pending.generation != generation {
                debug!(
                    "Service '{}' ignoring abandoned deferred transition",
                    self.name
                );
                return;
            }
            pending.handle = None;
        }
        if start {
            self.complete_start();
        } else {
            self.complete_stop();
        }
    }
}

/// A service whose lifecycle transitions are gated on another named service.
///
/// The peer is resolved through the injected [`ServiceLocator`] at each
/// start/stop call, never cached. If the peer is absent, the transition is
/// refused with `Ok(false)` and no notifications fire. If the peer is present
/// but not yet in the required state, completion is deferred behind a
/// one-shot listener on the peer's notification and the call returns
/// immediately.
///
/// Stop ordering is deliberate: the peer must finish stopping before this
/// service completes its own stop.
pub struct DependentService {
    inner: Arc<Inner>,
    locator: Arc<dyn ServiceLocator>,
}

impl DependentService {
    pub fn new<S: Into<String>>(name: S, peer: S, locator: Arc<dyn ServiceLocator>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                peer: peer.into(),
                running: AtomicBool::new(false),
                signals: LifecycleSignals::new(),
                pending: Mutex::new(Pending {
                    handle: None,
                    generation: 0,
                }),
            }),
            locator,
        }
    }

    /// Name of the service this one waits on
    pub fn peer(&self) -> &str {
        &self.inner.peer
    }

    /// Walk the dependency graph through the locator. Reaching our own name
    /// again means the host is configured with a cycle; deferral would then
    /// wait forever, so fail instead.
    fn detect_cycle(&self) -> Result<()> {
        let mut visited: Vec<String> = vec![self.inner.name.clone()];
        let mut stack: Vec<String> = vec![self.inner.peer.clone()];

        while let Some(current) = stack.pop() {
            if current == self.inner.name {
                visited.push(current);
                return Err(CaretakerError::DependencyCycle {
                    path: visited.join(" -> "),
                });
            }
            if visited.contains(&current) {
                continue;
            }
            visited.push(current.clone());
            if let Some(service) = self.locator.lookup(&current) {
                stack.extend(service.dependencies());
            }
        }

        Ok(())
    }
}

impl Service for DependentService {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    fn dependencies(&self) -> Vec<String> {
        vec![self.inner.peer.clone()]
    }

    fn signals(&self) -> &LifecycleSignals {
        &self.inner.signals
    }

    fn start(&self) -> Result<bool> {
        if self.is_running() {
            debug!(
                "Service '{}' already running; start is a no-op",
                self.inner.name
            );
            return Ok(true);
        }
        if self.inner.pending.lock().handle.is_some() {
            debug!("Service '{}' start already deferred", self.inner.name);
            return Ok(true);
        }

        self.detect_cycle()?;

        let peer = match self.locator.lookup(&self.inner.peer) {
            Some(peer) => peer,
            None => {
                info!(
                    "Service '{}' refusing to start: '{}' is not registered",
                    self.inner.name, self.inner.peer
                );
                return Ok(false);
            }
        };

        if peer.is_running() {
            // Dependency already satisfied; complete synchronously
            self.inner.complete_start();
        } else {
            let inner = Arc::clone(&self.inner);
            let generation = self.inner.pending.lock().generation;
            let handle = peer.signals().started().subscribe_once(move |_| {
                inner.complete_deferred(generation, true);
            });
            self.inner.pending.lock().handle = Some(handle);

            // The peer may have started between the check and the
            // registration; complete now rather than waiting on a
            // notification that already fired.
            if peer.is_running() {
                self.inner.clear_pending();
                self.inner.complete_start();
            } else {
                info!(
                    "Service '{}' waiting for '{}' to start",
                    self.inner.name, self.inner.peer
                );
            }
        }

        Ok(true)
    }

    fn stop(&self) -> Result<bool> {
        // A deferred transition that has not fired yet is abandoned
        self.inner.clear_pending();

        if !self.is_running() {
            debug!(
                "Service '{}' not running; stop is a no-op",
                self.inner.name
            );
            return Ok(true);
        }

        let peer = match self.locator.lookup(&self.inner.peer) {
            Some(peer) => peer,
            None => {
                error!(
                    "Service '{}' is running but '{}' is no longer registered",
                    self.inner.name, self.inner.peer
                );
                return Ok(false);
            }
        };

        if peer.is_running() {
            // Peer stops first; our own teardown completes once it is down
            let inner = Arc::clone(&self.inner);
            let generation = self.inner.pending.lock().generation;
            let handle = peer.signals().stopped().subscribe_once(move |_| {
                inner.complete_deferred(generation, false);
            });
            self.inner.pending.lock().handle = Some(handle);

            if !peer.is_running() {
                self.inner.clear_pending();
                self.inner.complete_stop();
            } else {
                info!(
                    "Service '{}' waiting for '{}' to stop",
                    self.inner.name, self.inner.peer
                );
            }
        } else {
            self.inner.complete_stop();
        }

        Ok(true)
    }
}
