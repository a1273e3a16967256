//! CLI route: one dispatch table from parsed commands to the publisher and server.

use crate::cli::parse::{Cli, Commands};
use crate::config::AppConfig;
use crate::course::{CourseSpec, PublishRequest};
use crate::error::{PublishError, SpecIssue};
use crate::logging::LoggingConfig;
use crate::publisher::{CoursePublisher, JobStatusView};
use crate::server::{serve, shutdown_signal};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Loaded configuration plus the command-line overrides that apply to it.
pub struct RunContext {
    config: AppConfig,
}

impl RunContext {
    pub fn new(workspace: &Path, config_path: Option<&Path>) -> Result<Self, PublishError> {
        Ok(Self {
            config: AppConfig::load(workspace, config_path)?,
        })
    }

    pub fn from_config(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Logging settings after applying CLI flags. One-shot commands stay silent unless
    /// `--verbose` is given.
    pub fn logging_config(&self, cli: &Cli) -> Result<LoggingConfig, PublishError> {
        let mut logging = self.config.logging.clone();
        let always_on = matches!(cli.command, Commands::Serve { .. });
        if !cli.verbose && !always_on {
            logging.level = "off".to_string();
            return Ok(logging);
        }
        if let Some(level) = &cli.log_level {
            logging.level = level.clone();
        }
        if let Some(format) = &cli.log_format {
            logging.format = format.parse()?;
        }
        if let Some(output) = &cli.log_output {
            logging.output = output.parse()?;
        }
        Ok(logging)
    }

    /// Execute a command and return what should be printed.
    pub async fn execute(&self, command: &Commands) -> Result<String, PublishError> {
        match command {
            Commands::Serve { bind } => self.serve(bind.as_deref()).await,
            Commands::Run { spec, request } => self.run(spec.as_deref(), request.as_deref()).await,
            Commands::CheckConfig => self.check_config(),
        }
    }

    async fn serve(&self, bind: Option<&str>) -> Result<String, PublishError> {
        let addr: SocketAddr = match bind {
            Some(bind) => bind.parse().map_err(|e| {
                PublishError::ConfigError(format!("--bind '{}': {}", bind, e))
            })?,
            None => self.config.bind_addr()?,
        };
        let publisher = Arc::new(CoursePublisher::from_config(&self.config)?);
        serve(
            publisher,
            addr,
            self.config.prune_interval(),
            shutdown_signal(),
        )
        .await?;
        Ok("Server stopped".to_string())
    }

    async fn run(
        &self,
        spec_path: Option<&Path>,
        request_path: Option<&Path>,
    ) -> Result<String, PublishError> {
        let publisher = CoursePublisher::from_config(&self.config)?;
        let record = match (spec_path, request_path) {
            (Some(path), _) => publisher.run_to_completion(read_spec(path)?).await?,
            (None, Some(path)) => publisher.run_request_to_completion(read_json(path)?).await?,
            (None, None) => {
                return Err(PublishError::ConfigError(
                    "run needs --spec or --request".to_string(),
                ))
            }
        };
        info!(job_id = %record.job_id, status = %record.status, "Run finished");
        serde_json::to_string_pretty(&JobStatusView::from(record))
            .map_err(|e| PublishError::ConfigError(format!("Failed to render job record: {}", e)))
    }

    fn check_config(&self) -> Result<String, PublishError> {
        let issues = self.config.validate();
        if !issues.is_empty() {
            return Err(issues.into());
        }
        Ok(format!(
            "Configuration OK: store={:?}, model={}, workers={}, validation={:?}",
            self.config.store.backend,
            self.config.provider.model,
            self.config.orchestrator.worker_pool_size,
            self.config.orchestrator.validation,
        ))
    }
}

fn read_spec(path: &Path) -> Result<CourseSpec, PublishError> {
    read_json(path)
}

/// Read a spec or request file; a file that does not parse is reported as a spec issue at `$`.
fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, PublishError> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map_err(|e| PublishError::SpecValidation(vec![SpecIssue::new("$", e.to_string())]))
}
