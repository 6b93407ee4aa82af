pub mod config;
pub mod error;
pub mod job;
pub mod lifecycle;
pub mod mail;

pub use config::CaretakerConfig;
pub use error::{CaretakerError, Result};
pub use job::{
    Completion, GreetingJob, Job, JobContext, JobManager, JobParams, JobRunner, JobState,
    ParamKind, ParamValue, ParameterDef, RegistrarService, StartPolicy, SweepJob,
};
pub use lifecycle::{
    DependentService, LifecycleEvent, LifecycleManager, LifecyclePhase, LifecycleSignals, Service,
    ServiceLocator, ServiceRegistry, ServiceState, SignalHub, SubscriptionHandle, TickerService,
};
pub use mail::{Broadcaster, MailBuffer, MailMessage, MailPriority};
