//! Configuration System
//!
//! Layered configuration: built-in defaults, `config/config.toml`,
//! `config/{LEARNCRAFTER_ENV}.toml`, an explicit `--config` file, then environment variables
//! of the form `LEARNCRAFTER__SECTION__KEY`. Everything is checked once at startup; the
//! checks report every problem instead of stopping at the first.

use crate::error::{ConfigIssue, PublishError};
use crate::job::RetentionPolicy;
use crate::logging::LoggingConfig;
use crate::orchestrator::OrchestratorSettings;
use crate::provider::ProviderConfig;
use crate::retry::RetryPolicy;
use crate::validator::{RuleConfig, ValidationMode};
use crate::workflow::{default_prompts, default_steps, Workflow, WorkflowStep};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod sources;

pub use sources::{ENV_NAME, ENV_PREFIX};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub orchestrator: OrchestratorConfig,
    pub jobs: JobsConfig,
    pub provider: ProviderConfig,
    pub workflow: WorkflowConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub worker_pool_size: usize,
    /// Bound on one generation or review attempt.
    pub generation_timeout_secs: u64,
    /// Bound on one store call.
    pub store_timeout_secs: u64,
    pub retry: RetryConfig,
    /// Regenerations allowed after the first rejected draft.
    pub max_regenerations: u32,
    pub validation: ValidationMode,
    pub rules: RuleConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 4,
            generation_timeout_secs: 120,
            store_timeout_secs: 30,
            retry: RetryConfig::default(),
            max_regenerations: 2,
            validation: ValidationMode::default(),
            rules: RuleConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

/// Retention of finished job records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub retention_secs: u64,
    pub max_finished: usize,
    pub prune_interval_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            retention_secs: 86_400,
            max_finished: 1000,
            prune_interval_secs: 300,
        }
    }
}

/// Overrides for the step bindings and prompt bodies. Entries here are laid over the
/// built-in workflow, so a file only needs to name what it changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub steps: BTreeMap<WorkflowStep, String>,
    pub prompts: BTreeMap<String, String>,
}

impl WorkflowConfig {
    pub fn resolve(&self) -> Result<Workflow, Vec<ConfigIssue>> {
        let mut steps = default_steps();
        steps.extend(self.steps.clone());
        let mut prompts = default_prompts();
        prompts.extend(self.prompts.clone());
        Workflow::resolve(&steps, &prompts)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Database directory for the sled backend.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: PathBuf::from("data/learncrafter.db"),
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

impl AppConfig {
    /// Load every layer rooted at `base_dir`, with an optional explicit file on top.
    pub fn load(base_dir: &Path, explicit: Option<&Path>) -> Result<Self, PublishError> {
        let builder = config::Config::builder();
        let builder = sources::add_directory_files(builder, base_dir)?;
        let builder = match explicit {
            Some(path) => sources::add_explicit_file(builder, path)?,
            None => builder,
        };
        let builder = sources::add_environment(builder);

        let mut app: AppConfig = builder.build()?.try_deserialize()?;
        if app.provider.api_key.is_none() {
            app.provider.api_key = std::env::var("OPENAI_API_KEY").ok();
        }
        Ok(app)
    }

    /// Every problem with this configuration, in section order.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.server.bind.parse::<SocketAddr>().is_err() {
            issues.push(ConfigIssue::new(
                "server.bind",
                format!("'{}' is not a socket address", self.server.bind),
            ));
        }

        let orchestrator = &self.orchestrator;
        if orchestrator.worker_pool_size == 0 {
            issues.push(ConfigIssue::new(
                "orchestrator.worker_pool_size",
                "must be at least 1",
            ));
        }
        if orchestrator.generation_timeout_secs == 0 {
            issues.push(ConfigIssue::new(
                "orchestrator.generation_timeout_secs",
                "must be greater than zero",
            ));
        }
        if orchestrator.store_timeout_secs == 0 {
            issues.push(ConfigIssue::new(
                "orchestrator.store_timeout_secs",
                "must be greater than zero",
            ));
        }
        if orchestrator.retry.max_attempts == 0 {
            issues.push(ConfigIssue::new(
                "orchestrator.retry.max_attempts",
                "must be at least 1",
            ));
        }
        if orchestrator.retry.base_delay_ms > orchestrator.retry.max_delay_ms {
            issues.push(ConfigIssue::new(
                "orchestrator.retry.base_delay_ms",
                "must not exceed orchestrator.retry.max_delay_ms",
            ));
        }
        if orchestrator.rules.max_content_length == 0 {
            issues.push(ConfigIssue::new(
                "orchestrator.rules.max_content_length",
                "must be greater than zero",
            ));
        }

        if self.jobs.prune_interval_secs == 0 {
            issues.push(ConfigIssue::new(
                "jobs.prune_interval_secs",
                "must be greater than zero",
            ));
        }

        let provider = &self.provider;
        if !(provider.base_url.starts_with("http://") || provider.base_url.starts_with("https://"))
        {
            issues.push(ConfigIssue::new(
                "provider.base_url",
                "must start with http:// or https://",
            ));
        }
        if provider.model.trim().is_empty() {
            issues.push(ConfigIssue::new("provider.model", "must not be empty"));
        }
        if let Some(temperature) = provider.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                issues.push(ConfigIssue::new(
                    "provider.temperature",
                    "must be between 0.0 and 2.0",
                ));
            }
        }
        if provider.max_tokens == Some(0) {
            issues.push(ConfigIssue::new(
                "provider.max_tokens",
                "must be greater than zero",
            ));
        }

        if let Err(workflow_issues) = self.workflow.resolve() {
            issues.extend(workflow_issues);
        }

        if self.store.backend == StoreBackend::Sled && self.store.path.as_os_str().is_empty() {
            issues.push(ConfigIssue::new(
                "store.path",
                "is required for the sled backend",
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            issues.push(ConfigIssue::new(
                "logging.level",
                format!("'{}' is not one of {}", self.logging.level, LOG_LEVELS.join(", ")),
            ));
        }

        issues
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, PublishError> {
        self.server.bind.parse().map_err(|e| {
            PublishError::ConfigError(format!("server.bind '{}': {}", self.server.bind, e))
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let orchestrator = &self.orchestrator;
        RetryPolicy {
            max_attempts: orchestrator.retry.max_attempts,
            base_delay: Duration::from_millis(orchestrator.retry.base_delay_ms),
            max_delay: Duration::from_millis(orchestrator.retry.max_delay_ms),
            attempt_timeout: Duration::from_secs(orchestrator.generation_timeout_secs),
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            worker_pool_size: self.orchestrator.worker_pool_size,
            store_timeout: Duration::from_secs(self.orchestrator.store_timeout_secs),
            retry: self.retry_policy(),
            max_regenerations: self.orchestrator.max_regenerations,
        }
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_age: Duration::from_secs(self.jobs.retention_secs),
            max_finished: self.jobs.max_finished,
        }
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.jobs.prune_interval_secs)
    }
}
