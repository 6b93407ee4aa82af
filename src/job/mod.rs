pub mod builtin;
pub mod manager;
pub mod params;
pub mod runner;


pub use builtin::{GreetingJob, SweepJob};
pub use manager::{JobManager, RegistrarService, StartPolicy};
pub use params::{JobParams, ParamKind, ParamValue, ParameterDef};
pub use runner::JobRunner;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Observable run state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Never run since creation
    Idle,
    /// A run is in progress
    Running,
    /// Last run finished normally
    Completed,
    /// Last run observed a cancellation request and stopped cooperatively
    Cancelled,
    /// Last run failed; the cause was surfaced to the caller
    Aborted,
}

impl JobState {
    /// True for the states a run may end in
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Cancelled | JobState::Aborted
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Idle => "idle",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Cancelled => "cancelled",
            JobState::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// How a job body ended a successful run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The work ran to the end
    Finished,
    /// The body observed a cancellation request and stopped early
    Cancelled,
}

/// Per-run context handed to a job body: the caller's parameters plus the
/// cooperative cancellation signal.
pub struct JobContext {
    run_id: Uuid,
    params: JobParams,
    cancel: CancellationToken,
}

impl JobContext {
    pub(crate) fn new(params: JobParams, cancel: CancellationToken) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            params,
            cancel,
        }
    }

    /// Identifier for this run, for log correlation
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn params(&self) -> &JobParams {
        &self.params
    }

    /// Poll the cancellation request. Long-running bodies check this at each
    /// unit-of-work boundary.
    pub fn cancellation_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Sleep for up to `period`, waking early on cancellation. Returns `true`
    /// when cancellation was observed, bounding cancellation latency at one
    /// polling interval.
    pub async fn idle(&self, period: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = tokio::time::sleep(period) => self.cancel.is_cancelled(),
        }
    }
}

/// A unit of schedulable work with declared parameters, an observable run
/// state, and optional cooperative cancellation.
///
/// Implementations supply only the body; [`JobRunner`] owns the state
/// machine, the timestamps, and the fault wrapping, so no job can be left
/// stuck in `Running` or silently swallow a failure.
#[async_trait]
pub trait Job: Send + Sync {
    /// Job name, unique within a manager
    fn name(&self) -> &str;

    /// Whether a running body honors cancellation requests
    fn can_cancel(&self) -> bool {
        false
    }

    /// Declared parameter schema, in positional order. Empty means the job
    /// accepts no parameters.
    fn parameters(&self) -> Vec<ParameterDef> {
        Vec::new()
    }

    /// Execute one run. Return [`Completion::Cancelled`] after observing a
    /// cancellation request; any `Err` aborts the run and is wrapped for the
    /// caller.
    async fn execute(&self, ctx: &JobContext) -> anyhow::Result<Completion>;
}
