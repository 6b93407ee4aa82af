use super::params::{ParamKind, ParameterDef};
use super::{Completion, Job, JobContext};
use crate::mail::{Broadcaster, MailMessage};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Broadcasts a greeting through the host's messaging collaborator.
///
/// Accepts a single optional text parameter `your_name`; when the caller
/// supplies nothing (or the wrong type), the documented default
/// `"Mystery User"` is substituted. Does not support cancellation.
pub struct GreetingJob {
    post: Arc<dyn Broadcaster>,
}

impl GreetingJob {
    pub const DEFAULT_NAME: &'static str = "Mystery User";

    pub fn new(post: Arc<dyn Broadcaster>) -> Self {
        Self { post }
    }
}

#[async_trait]
impl Job for GreetingJob {
    fn name(&self) -> &str {
        "greeting"
    }

    fn parameters(&self) -> Vec<ParameterDef> {
        vec![ParameterDef::new("your_name", ParamKind::Text)]
    }

    async fn execute(&self, ctx: &JobContext) -> anyhow::Result<Completion> {
        let your_name = ctx.params().text(0).unwrap_or(Self::DEFAULT_NAME);

        let message = MailMessage::new(
            "caretaker",
            your_name,
            "Hello World!",
            format!("Hello {}! This is a message from my job!", your_name),
        );
        self.post.broadcast(message)?;

        Ok(Completion::Finished)
    }
}

/// A long-running, cancellable job: one logged pass per polling interval
/// until cancelled, or until the optional pass limit is reached.
///
/// The polling interval bounds cancellation latency; a cancel request is
/// observed within one interval.
pub struct SweepJob {
    name: String,
    period: Duration,
    limit: Option<u64>,
}

impl SweepJob {
    /// Unbounded sweep; only a cancel request ends the run
    pub fn new<S: Into<String>>(name: S, period: Duration) -> Self {
        Self {
            name: name.into(),
            period,
            limit: None,
        }
    }

    /// Sweep that completes on its own after `limit` passes
    pub fn with_limit<S: Into<String>>(name: S, period: Duration, limit: u64) -> Self {
        Self {
            name: name.into(),
            period,
            limit: Some(limit),
        }
    }
}

#[async_trait]
impl Job for SweepJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_cancel(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &JobContext) -> anyhow::Result<Completion> {
        let mut passes: u64 = 0;
        loop {
            if ctx.idle(self.period).await {
                info!("Sweep '{}' observed cancel after {} pass(es)", self.name, passes);
                return Ok(Completion::Cancelled);
            }

            passes += 1;
            info!("Sweep '{}' pass {}", self.name, passes);

            if let Some(limit) = self.limit {
                if passes >= limit {
                    return Ok(Completion::Finished);
                }
            }
        }
    }
}
