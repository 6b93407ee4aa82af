use super::signals::{LifecyclePhase, LifecycleSignals};
use super::Service;
use crate::error::Result;
use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info};

struct Worker {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

/// A daemon service that fires a periodic action on a dedicated worker
/// thread.
///
/// The worker waits on a channel with a timeout equal to the tick period, so
/// `stop` wakes it immediately instead of waiting out the period. `stop`
/// joins the worker before emitting the `Stopped` notification, which
/// guarantees no tick fires after `stop` returns.
pub struct TickerService {
    name: String,
    period: Duration,
    action: Arc<dyn Fn() + Send + Sync>,
    signals: LifecycleSignals,
    /// Atomically claimed by `start` and released by `stop`, so two
    /// concurrent starts can never both spawn a worker
    running: AtomicBool,
    worker: Mutex<Option<Worker>>,
}

impl TickerService {
    pub fn new<S, F>(name: S, period: Duration, action: F) -> Self
    where
        S: Into<String>,
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            period,
            action: Arc::new(action),
            signals: LifecycleSignals::new(),
            running: AtomicBool::new(false),
            worker: Mutex::new(None),
        }
    }

    /// Ticker that logs a greeting once per period
    pub fn hello<S: Into<String>>(name: S, period: Duration) -> Self {
        Self::new(name, period, || info!("Hello World!"))
    }
}

impl Service for TickerService {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn signals(&self) -> &LifecycleSignals {
        &self.signals
    }

    fn start(&self) -> Result<bool> {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Service '{}' already running; start is a no-op", self.name);
            return Ok(true);
        }

        self.signals.emit(&self.name, LifecyclePhase::Starting);

        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let action = Arc::clone(&self.action);
        let period = self.period;
        let name = self.name.clone();
        let handle = std::thread::spawn(move || {
            debug!("Ticker '{}' worker started", name);
            loop {
                match shutdown_rx.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => action(),
                    _ => break,
                }
            }
            debug!("Ticker '{}' worker exited", name);
        });

        *self.worker.lock() = Some(Worker {
            shutdown: shutdown_tx,
            handle,
        });

        info!("Service '{}' started (period {:?})", self.name, self.period);
        self.signals.emit(&self.name, LifecyclePhase::Started);
        Ok(true)
    }

    fn stop(&self) -> Result<bool> {
        if !self.running.swap(false, Ordering::SeqCst) {
            debug!("Service '{}' not running; stop is a no-op", self.name);
            return Ok(true);
        }

        self.signals.emit(&self.name, LifecyclePhase::Stopping);

        // Wake the worker, then wait for it to exit before announcing the
        // stop. A tick can never fire once this returns.
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            drop(worker.shutdown);
            if worker.handle.join().is_err() {
                error!("Ticker '{}' worker panicked during shutdown", self.name);
            }
        }

        info!("Service '{}' stopped", self.name);
        self.signals.emit(&self.name, LifecyclePhase::Stopped);
        Ok(true)
    }
}
