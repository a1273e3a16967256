//! Course publisher facade.
//!
//! Owns the job registry and the orchestrator; everything outside the crate core (HTTP
//! handlers, the CLI) goes through here.

use crate::config::{AppConfig, StoreBackend};
use crate::course::{validate_request, CourseSpec, PublishRequest};
use crate::error::PublishError;
use crate::generator::{Generator, ProviderGenerator};
use crate::job::{
    EntityRef, ErrorKind, JobProgress, JobRecord, JobStatus, JobStore, RetentionPolicy,
};
use crate::orchestrator::Orchestrator;
use crate::planner::Planner;
use crate::provider::{ChatClient, CompletionOptions, OpenAiCompatibleClient};
use crate::store::{CourseStore, MemoryStore, SledStore};
use crate::types::JobId;
use crate::validator::build_validator;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// A job record as reported to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusView {
    #[serde(flatten)]
    pub record: JobRecord,
    pub progress_percentage: f64,
}

impl From<JobRecord> for JobStatusView {
    fn from(record: JobRecord) -> Self {
        Self {
            progress_percentage: record.progress.percent_complete(),
            record,
        }
    }
}

#[derive(Clone)]
pub struct CoursePublisher {
    orchestrator: Orchestrator,
    planner: Planner,
    retention: RetentionPolicy,
}

impl CoursePublisher {
    pub fn new(orchestrator: Orchestrator, retention: RetentionPolicy) -> Self {
        let planner = Planner::new(
            orchestrator.generator().clone(),
            orchestrator.settings().retry,
        );
        Self {
            orchestrator,
            planner,
            retention,
        }
    }

    /// Wire the store, provider client, workflow and validators described by `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self, PublishError> {
        let issues = config.validate();
        if !issues.is_empty() {
            return Err(issues.into());
        }

        let store: Arc<dyn CourseStore> = match config.store.backend {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::Sled => Arc::new(SledStore::open(&config.store.path)?),
        };

        let client: Arc<dyn ChatClient> = Arc::new(OpenAiCompatibleClient::new(
            &config.provider,
            Duration::from_secs(config.orchestrator.generation_timeout_secs),
        )?);
        let workflow = Arc::new(config.workflow.resolve()?);

        let generator: Arc<dyn Generator> = Arc::new(
            ProviderGenerator::new(client.clone(), workflow.clone())
                .with_options(CompletionOptions {
                    temperature: config.provider.temperature,
                    max_tokens: config.provider.max_tokens,
                })
                .with_system_prompt(config.provider.system_prompt.clone()),
        );
        let validator = build_validator(
            config.orchestrator.validation,
            &config.orchestrator.rules,
            client,
            workflow,
        );

        info!(
            store = ?config.store.backend,
            model = %config.provider.model,
            validation = ?config.orchestrator.validation,
            workers = config.orchestrator.worker_pool_size,
            "Course publisher configured"
        );

        let orchestrator = Orchestrator::new(
            Arc::new(JobStore::new()),
            store,
            generator,
            validator,
            config.orchestrator_settings(),
        );
        Ok(Self::new(orchestrator, config.retention_policy()))
    }

    pub fn jobs(&self) -> &Arc<JobStore> {
        self.orchestrator.jobs()
    }

    pub fn store(&self) -> &Arc<dyn CourseStore> {
        self.orchestrator.store()
    }

    /// Register a job and start it in the background. Must be called inside a tokio runtime.
    pub fn submit(&self, spec: CourseSpec) -> Result<JobId, PublishError> {
        let job_id = self.jobs().create(&spec)?;
        let orchestrator = self.orchestrator.clone();
        tokio::spawn(drive(orchestrator, job_id, Arc::new(spec)));
        Ok(job_id)
    }

    /// Register a job and run it on the current task.
    pub async fn run_to_completion(&self, spec: CourseSpec) -> Result<JobRecord, PublishError> {
        let job_id = self.jobs().create(&spec)?;
        drive(self.orchestrator.clone(), job_id, Arc::new(spec)).await;
        self.jobs().get(job_id)
    }

    /// Register a job for a request that may still need planning and start it in the
    /// background. A request with nothing left to plan is submitted as its spec.
    pub fn submit_request(&self, request: PublishRequest) -> Result<JobId, PublishError> {
        validate_request(&request)?;
        if let Some(spec) = request.complete_spec() {
            return self.submit(spec);
        }
        let job_id = self.jobs().create_planning(&request)?;
        tokio::spawn(plan_and_drive(
            self.planner.clone(),
            self.orchestrator.clone(),
            job_id,
            request,
        ));
        Ok(job_id)
    }

    /// Plan (if needed) and run a request on the current task.
    pub async fn run_request_to_completion(
        &self,
        request: PublishRequest,
    ) -> Result<JobRecord, PublishError> {
        validate_request(&request)?;
        if let Some(spec) = request.complete_spec() {
            return self.run_to_completion(spec).await;
        }
        let job_id = self.jobs().create_planning(&request)?;
        plan_and_drive(
            self.planner.clone(),
            self.orchestrator.clone(),
            job_id,
            request,
        )
        .await;
        self.jobs().get(job_id)
    }

    pub fn status(&self, job_id: JobId) -> Result<JobStatusView, PublishError> {
        self.jobs().get(job_id).map(JobStatusView::from)
    }

    pub fn cancel(&self, job_id: JobId) -> Result<JobStatusView, PublishError> {
        self.jobs().request_cancel(job_id).map(JobStatusView::from)
    }

    pub fn prune(&self) -> usize {
        self.jobs().prune(&self.retention, Utc::now())
    }

    /// Prune finished jobs every `interval` until the returned handle is aborted.
    pub fn spawn_pruner(&self, interval: Duration) -> JoinHandle<()> {
        let jobs = self.jobs().clone();
        let policy = self.retention;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                jobs.prune(&policy, Utc::now());
            }
        })
    }
}

/// Plan the outline of a planning job, then run it. A planning failure or a cancel that
/// arrives while planning fails the job before anything is stored.
async fn plan_and_drive(
    planner: Planner,
    orchestrator: Orchestrator,
    job_id: JobId,
    request: PublishRequest,
) {
    let jobs = orchestrator.jobs().clone();
    let planned = match tokio::spawn(async move { planner.plan(&request).await }).await {
        Ok(Ok(spec)) => Ok(spec),
        Ok(Err(err)) => Err((ErrorKind::Planning, err.to_string())),
        Err(err) => Err((ErrorKind::Internal, format!("planning task aborted: {}", err))),
    };

    let marked = jobs.update(job_id, |r| match planned {
        Err((kind, message)) => {
            warn!(job_id = %job_id, error = %message, "Course planning failed");
            r.record_error(EntityRef::Job, kind, message);
            r.current_step = "Failed".to_string();
            r.transition(JobStatus::Failed).map(|_| None)
        }
        Ok(_) if r.cancel_requested => {
            info!(job_id = %job_id, "Job cancelled during planning");
            r.record_error(
                EntityRef::Job,
                ErrorKind::Cancelled,
                "Job cancelled before its plan was used",
            );
            r.current_step = "Cancelled".to_string();
            r.transition(JobStatus::Failed).map(|_| None)
        }
        Ok(spec) => {
            r.progress = JobProgress::for_spec(&spec);
            r.current_step = "Queued".to_string();
            Ok(Some(spec))
        }
    });

    match marked {
        Ok(Ok(Some(spec))) => drive(orchestrator, job_id, Arc::new(spec)).await,
        Ok(Ok(None)) | Err(PublishError::JobFinalized(_)) => {}
        Ok(Err(err)) | Err(err) => {
            error!(job_id = %job_id, error = %err, "Could not record planning result");
        }
    }
}

/// Run one job to a terminal status. If the orchestrator returns an error or panics, the
/// job is failed here so that it never stays pending or running.
async fn drive(orchestrator: Orchestrator, job_id: JobId, spec: Arc<CourseSpec>) {
    let jobs = orchestrator.jobs().clone();
    let joined = tokio::spawn(async move { orchestrator.run(job_id, spec).await }).await;

    let failure = match joined {
        Ok(Ok(status)) => {
            debug!(job_id = %job_id, status = %status, "Job settled");
            return;
        }
        Ok(Err(err)) => err.to_string(),
        Err(err) => format!("orchestrator task aborted: {}", err),
    };
    error!(job_id = %job_id, error = %failure, "Job stopped unexpectedly");

    let marked = jobs.update(job_id, |r| {
        r.record_error(EntityRef::Job, ErrorKind::Internal, failure);
        r.current_step = "Failed".to_string();
        r.transition(JobStatus::Failed)
    });
    match marked {
        Ok(Ok(())) | Err(PublishError::JobFinalized(_)) => {}
        Ok(Err(err)) | Err(err) => {
            error!(job_id = %job_id, error = %err, "Could not mark job failed");
        }
    }
}
