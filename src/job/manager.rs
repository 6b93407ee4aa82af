use super::params::JobParams;
use super::runner::JobRunner;
use super::{Job, JobState};
use crate::error::{CaretakerError, Result};
use crate::lifecycle::signals::{LifecyclePhase, LifecycleSignals};
use crate::lifecycle::Service;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Auto-start policy for a registered job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPolicy {
    /// Only ever run when explicitly invoked
    Never,
    /// Run automatically once per registered interval
    OnInterval,
}

struct RegisteredJob {
    runner: Arc<JobRunner>,
    interval: Option<Duration>,
    policy: StartPolicy,
}

/// Registration authority for jobs. Each run executes on its own spawned
/// worker, so one long-running job never blocks another's execution.
#[derive(Default)]
pub struct JobManager {
    jobs: RwLock<Vec<RegisteredJob>>,
}

impl JobManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job and return its runner handle. Registering a name twice
    /// replaces the earlier entry.
    pub fn add_job(
        &self,
        job: Arc<dyn Job>,
        interval: Option<Duration>,
        policy: StartPolicy,
    ) -> Arc<JobRunner> {
        let runner = Arc::new(JobRunner::new(job));
        let entry = RegisteredJob {
            runner: Arc::clone(&runner),
            interval,
            policy,
        };

        let mut jobs = self.jobs.write();
        if let Some(existing) = jobs.iter_mut().find(|j| j.runner.name() == runner.name()) {
            warn!("Replacing already-registered job '{}'", runner.name());
            *existing = entry;
        } else {
            info!("Registered job '{}' ({:?})", runner.name(), policy);
            jobs.push(entry);
        }
        runner
    }

    /// Look up a job's runner by name
    pub fn job(&self, name: &str) -> Option<Arc<JobRunner>> {
        self.jobs
            .read()
            .iter()
            .find(|j| j.runner.name() == name)
            .map(|j| Arc::clone(&j.runner))
    }

    /// Registered job names, in registration order
    pub fn names(&self) -> Vec<String> {
        self.jobs
            .read()
            .iter()
            .map(|j| j.runner.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    /// Run a job on a dedicated worker. The returned handle yields the run's
    /// result; a worker that dies without returning still leaves the job in
    /// a terminal state.
    pub fn spawn(&self, name: &str, params: JobParams) -> Result<JoinHandle<Result<()>>> {
        let runner = self.job(name).ok_or_else(|| {
            CaretakerError::system(format!("no job registered under '{}'", name))
        })?;

        Ok(tokio::spawn(async move {
            let body = tokio::spawn({
                let runner = Arc::clone(&runner);
                async move { runner.run(params).await }
            });
            match body.await {
                Ok(result) => result,
                Err(join_err) => {
                    runner.mark_aborted();
                    Err(CaretakerError::system(format!(
                        "job '{}' worker panicked: {}",
                        runner.name(),
                        join_err
                    )))
                }
            }
        }))
    }

    /// Spawn an interval ticker for every `OnInterval` job. Tickers run until
    /// the token is cancelled; the first run fires one interval after the
    /// call, not immediately.
    pub fn start_schedules(&self, token: &CancellationToken) {
        for job in self.jobs.read().iter() {
            let interval = match (job.policy, job.interval) {
                (StartPolicy::OnInterval, Some(interval)) => interval,
                (StartPolicy::OnInterval, None) => {
                    warn!(
                        "Job '{}' has OnInterval policy but no interval; skipping schedule",
                        job.runner.name()
                    );
                    continue;
                }
                (StartPolicy::Never, _) => continue,
            };

            let runner = Arc::clone(&job.runner);
            let token = token.clone();
            tokio::spawn(async move {
                let start = tokio::time::Instant::now() + interval;
                let mut ticker = tokio::time::interval_at(start, interval);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => {
                            if let Err(e) = runner.run(JobParams::none()).await {
                                error!("Scheduled run of '{}' failed: {}", runner.name(), e);
                            }
                        }
                    }
                }
            });
        }
    }

    /// Wind down job execution: halt the schedules behind `token`, request
    /// cancellation of every running cancellable job, then wait up to `grace`
    /// (typically [`CaretakerConfig::worker_shutdown`]) for in-flight runs to
    /// reach a terminal state. Workers still running afterwards are logged
    /// and left to finish on their own.
    ///
    /// [`CaretakerConfig::worker_shutdown`]: crate::config::CaretakerConfig::worker_shutdown
    pub async fn shutdown(&self, token: &CancellationToken, grace: Duration) {
        token.cancel();

        for runner in self.runners() {
            if runner.state() == JobState::Running && runner.can_cancel() {
                if let Err(e) = runner.cancel() {
                    warn!("Could not cancel '{}' during shutdown: {}", runner.name(), e);
                }
            }
        }

        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let still_running: Vec<String> = self
                .runners()
                .into_iter()
                .filter(|r| r.state() == JobState::Running)
                .map(|r| r.name().to_string())
                .collect();
            if still_running.is_empty() {
                info!("All job workers drained");
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    "Worker(s) still running after {:?} shutdown grace: {}",
                    grace,
                    still_running.join(", ")
                );
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn runners(&self) -> Vec<Arc<JobRunner>> {
        self.jobs
            .read()
            .iter()
            .map(|j| Arc::clone(&j.runner))
            .collect()
    }
}

/// A service whose only startup work is registering a configured set of jobs
/// with a [`JobManager`].
///
/// Mirrors the registration-daemon pattern: it reports not-running even
/// after a successful start, but its lifecycle notifications still fire
/// around the registration work.
pub struct RegistrarService {
    name: String,
    manager: Arc<JobManager>,
    pending: Mutex<Vec<(Arc<dyn Job>, Option<Duration>, StartPolicy)>>,
    signals: LifecycleSignals,
}

impl RegistrarService {
    pub fn new<S: Into<String>>(name: S, manager: Arc<JobManager>) -> Self {
        Self {
            name: name.into(),
            manager,
            pending: Mutex::new(Vec::new()),
            signals: LifecycleSignals::new(),
        }
    }

    /// Queue a job for registration at start time
    pub fn with_job(
        self,
        job: Arc<dyn Job>,
        interval: Option<Duration>,
        policy: StartPolicy,
    ) -> Self {
        self.pending.lock().push((job, interval, policy));
        self
    }
}

impl Service for RegistrarService {
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
        self.signals.emit(&self.name, LifecyclePhase::Starting);

        let pending: Vec<_> = self.pending.lock().drain(..).collect();
        let count = pending.len();
        for (job, interval, policy) in pending {
            self.manager.add_job(job, interval, policy);
        }
        info!("'{}' registered {} job(s)", self.name, count);

        self.signals.emit(&self.name, LifecyclePhase::Started);
        Ok(true)
    }

    fn stop(&self) -> Result<bool> {
        self.signals.emit(&self.name, LifecyclePhase::Stopping);
        self.signals.emit(&self.name, LifecyclePhase::Stopped);
        Ok(true)
    }
}
