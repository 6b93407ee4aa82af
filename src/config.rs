use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaretakerConfig {
    pub lifecycle: LifecycleConfig,
    pub jobs: JobsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LifecycleConfig {
    /// Period between ticker daemon firings, in milliseconds
    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,

    /// How long a service stop may take before the manager logs it as slow
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct JobsConfig {
    /// Cancellation polling interval for long-running jobs, in milliseconds.
    /// This bounds the latency between a cancel request and the job
    /// observing it.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Grace period for in-flight job workers during shutdown
    #[serde(default = "default_worker_shutdown_ms")]
    pub worker_shutdown_ms: u64,
}

impl CaretakerConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("caretaker.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("lifecycle.tick_period_ms", default_tick_period_ms())?
            .set_default("lifecycle.stop_grace_ms", default_stop_grace_ms())?
            .set_default("jobs.poll_interval_ms", default_poll_interval_ms())?
            .set_default("jobs.worker_shutdown_ms", default_worker_shutdown_ms())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with CARETAKER_ prefix. Field names
            // contain underscores, so nesting uses a double underscore:
            // CARETAKER_JOBS__POLL_INTERVAL_MS -> jobs.poll_interval_ms
            .add_source(
                Environment::with_prefix("CARETAKER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: CaretakerConfig = settings.try_deserialize()?;
        config.validate()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lifecycle.tick_period_ms == 0 {
            return Err(ConfigError::Message(
                "lifecycle.tick_period_ms must be greater than 0".to_string(),
            ));
        }

        if self.jobs.poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "jobs.poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.lifecycle.tick_period_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.jobs.poll_interval_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.lifecycle.stop_grace_ms)
    }

    pub fn worker_shutdown(&self) -> Duration {
        Duration::from_millis(self.jobs.worker_shutdown_ms)
    }
}

impl Default for CaretakerConfig {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleConfig {
                tick_period_ms: default_tick_period_ms(),
                stop_grace_ms: default_stop_grace_ms(),
            },
            jobs: JobsConfig {
                poll_interval_ms: default_poll_interval_ms(),
                worker_shutdown_ms: default_worker_shutdown_ms(),
            },
        }
    }
}

fn default_tick_period_ms() -> u64 {
    1000
}
fn default_stop_grace_ms() -> u64 {
    5000
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_worker_shutdown_ms() -> u64 {
    2000
}
