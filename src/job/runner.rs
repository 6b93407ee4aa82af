use super::{Completion, Job, JobContext, JobState};
use super::params::{JobParams, ParameterDef};
use crate::error::{CaretakerError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

struct Status {
    state: JobState,
    last_started: Option<DateTime<Utc>>,
    last_finished: Option<DateTime<Utc>>,
}

/// Executes a [`Job`] and owns everything the job body must not be trusted
/// with: the Idle/Running/terminal state machine, the run timestamps, the
/// cancellation token, and the single catch point for faults.
///
/// Invariants enforced here:
/// - the state is never left at `Running` after `run` returns, on any path;
/// - `last_finished` is always set on exit and is never earlier than
///   `last_started`;
/// - a failed body is wrapped into [`CaretakerError::JobExecution`] carrying
///   the original cause, never swallowed.
pub struct JobRunner {
    job: Arc<dyn Job>,
    status: Mutex<Status>,
    cancel: Mutex<CancellationToken>,
}

impl JobRunner {
    pub fn new(job: Arc<dyn Job>) -> Self {
        Self {
            job,
            status: Mutex::new(Status {
                state: JobState::Idle,
                last_started: None,
                last_finished: None,
            }),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn name(&self) -> &str {
        self.job.name()
    }

    pub fn can_cancel(&self) -> bool {
        self.job.can_cancel()
    }

    pub fn parameters(&self) -> Vec<ParameterDef> {
        self.job.parameters()
    }

    pub fn state(&self) -> JobState {
        self.status.lock().state
    }

    pub fn last_started(&self) -> Option<DateTime<Utc>> {
        self.status.lock().last_started
    }

    pub fn last_finished(&self) -> Option<DateTime<Utc>> {
        self.status.lock().last_finished
    }

    /// Execute one run with the given parameters.
    ///
    /// Returns an error both for a rejected invocation (a run is already in
    /// progress) and for a failed body; in the latter case the state is
    /// `Aborted` and the error wraps the original cause.
    pub async fn run(&self, params: JobParams) -> Result<()> {
        // Fresh token per run; a token cancelled during a previous run must
        // not leak into this one. Installed before the state flips to
        // Running so a concurrent cancel always hits the right token.
        let token = CancellationToken::new();

        {
            let mut status = self.status.lock();
            if status.state == JobState::Running {
                return Err(CaretakerError::system(format!(
                    "job '{}' is already running",
                    self.job.name()
                )));
            }
            *self.cancel.lock() = token.clone();
            status.state = JobState::Running;
            status.last_started = Some(Utc::now());
        }

        let ctx = JobContext::new(params, token);
        info!(
            "Job '{}' run {} starting",
            self.job.name(),
            ctx.run_id()
        );

        let result = self.job.execute(&ctx).await;

        let mut status = self.status.lock();
        status.last_finished = Some(Utc::now());
        match result {
            Ok(Completion::Finished) => {
                status.state = JobState::Completed;
                info!("Job '{}' run {} completed", self.job.name(), ctx.run_id());
                Ok(())
            }
            Ok(Completion::Cancelled) => {
                status.state = JobState::Cancelled;
                info!("Job '{}' run {} cancelled", self.job.name(), ctx.run_id());
                Ok(())
            }
            Err(cause) => {
                status.state = JobState::Aborted;
                drop(status);
                error!(
                    "Job '{}' run {} aborted: {:#}",
                    self.job.name(),
                    ctx.run_id(),
                    cause
                );
                Err(CaretakerError::job_execution(self.job.name(), cause))
            }
        }
    }

    /// Request cooperative cancellation of the current run.
    ///
    /// Safe to call from any context at any time: a job that does not
    /// support cancellation rejects the request with
    /// [`CaretakerError::CancelNotSupported`] and its state is untouched; a
    /// job that is not running treats it as a no-op. A running body observes
    /// the request within one polling interval.
    pub fn cancel(&self) -> Result<()> {
        if !self.job.can_cancel() {
            return Err(CaretakerError::CancelNotSupported {
                job: self.job.name().to_string(),
            });
        }

        if self.status.lock().state != JobState::Running {
            debug!(
                "Cancel requested for '{}' while not running; ignoring",
                self.job.name()
            );
            return Ok(());
        }

        info!("Cancelling job '{}'", self.job.name());
        self.cancel.lock().cancel();
        Ok(())
    }

    /// Force the terminal state when a run's worker died without returning
    /// (e.g. the spawned task panicked). Keeps the state machine honest even
    /// when the body never came back.
    pub(crate) fn mark_aborted(&self) {
        let mut status = self.status.lock();
        if status.state == JobState::Running {
            status.state = JobState::Aborted;
            status.last_finished = Some(Utc::now());
            error!("Job '{}' worker died; marking run aborted", self.job.name());
        }
    }
}
