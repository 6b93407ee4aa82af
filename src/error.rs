use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaretakerError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Service {service} requires {dependency}, which is not registered")]
    DependencyMissing { service: String, dependency: String },

    #[error("Cyclic service dependency: {path}")]
    DependencyCycle { path: String },

    #[error("Job {job} does not support cancellation")]
    CancelNotSupported { job: String },

    #[error("Job {job} execution failed")]
    JobExecution {
        job: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("System error: {message}")]
    System { message: String },
}

impl CaretakerError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    /// Wrap a job body failure, preserving the original cause as `source`.
    pub fn job_execution<S: Into<String>>(job: S, source: anyhow::Error) -> Self {
        Self::JobExecution {
            job: job.into(),
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CaretakerError>;
