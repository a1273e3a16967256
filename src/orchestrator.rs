//! Job Orchestrator
//!
//! Drives one publishing job: course, then modules in spec order, then each module's concepts
//! fanned out to a bounded pool shared by the whole job. Per-entity failures are recorded and
//! never abort siblings; only a failed course creation ends the job early.

use crate::course::{validate_spec, ConceptRef, CourseSpec};
use crate::error::PublishError;
use crate::generator::Generator;
use crate::job::{EntityRef, ErrorKind, JobStatus, JobStore};
use crate::retry::RetryPolicy;
use crate::store::{CourseDraft, CourseStore, ModuleDraft};
use crate::types::{CourseId, JobId};
use crate::validator::Validator;
use crate::workflow::PromptVariables;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

mod concept;

pub use concept::{ConceptOutcome, GeneratedConcept};

use concept::{bounded, store_failure_kind, ConceptJob, ConceptWorker};

/// Tunables for a job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Concepts of one job generated concurrently.
    pub worker_pool_size: usize,
    pub store_timeout: Duration,
    /// Applies to Generator and Validator calls; `attempt_timeout` bounds each attempt.
    pub retry: RetryPolicy,
    pub max_regenerations: u32,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            worker_pool_size: 4,
            store_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            max_regenerations: 2,
        }
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    jobs: Arc<JobStore>,
    store: Arc<dyn CourseStore>,
    generator: Arc<dyn Generator>,
    validator: Option<Arc<dyn Validator>>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        jobs: Arc<JobStore>,
        store: Arc<dyn CourseStore>,
        generator: Arc<dyn Generator>,
        validator: Option<Arc<dyn Validator>>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            jobs,
            store,
            generator,
            validator,
            settings,
        }
    }

    pub fn jobs(&self) -> &Arc<JobStore> {
        &self.jobs
    }

    pub fn store(&self) -> &Arc<dyn CourseStore> {
        &self.store
    }

    pub fn generator(&self) -> &Arc<dyn Generator> {
        &self.generator
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Run a job created in the job store to a terminal status.
    pub async fn run(&self, job_id: JobId, spec: Arc<CourseSpec>) -> Result<JobStatus, PublishError> {
        info!(job_id = %job_id, course = %spec.title, "Publishing job started");

        if let Err(err) = validate_spec(&spec) {
            error!(job_id = %job_id, error = %err, "Course spec rejected");
            return self.jobs.update(job_id, |r| {
                r.record_error(EntityRef::Job, ErrorKind::SpecValidation, err.to_string());
                r.current_step = "Failed".to_string();
                r.transition(JobStatus::Failed).map(|_| JobStatus::Failed)
            })?;
        }

        let Some(course_id) = self.create_course(job_id, &spec).await? else {
            return Ok(JobStatus::Failed);
        };

        let cancelled = self.dispatch_modules(job_id, course_id, &spec).await?;

        let status = self.jobs.update(job_id, |r| {
            if cancelled {
                let skipped_modules = r.progress.modules_remaining();
                r.progress.modules_skipped_by(skipped_modules);
                let skipped = r.progress.concepts_remaining();
                r.progress.concepts_skipped_by(skipped);
                r.record_error(
                    EntityRef::Job,
                    ErrorKind::Cancelled,
                    format!(
                        "Job cancelled with {} module(s) and {} concept(s) never scheduled",
                        skipped_modules, skipped
                    ),
                );
                r.current_step = "Cancelled".to_string();
            } else {
                r.current_step = "Finished".to_string();
            }
            let status = r.settled_status();
            r.transition(status).map(|_| status)
        })??;

        let errors = self.jobs.get(job_id).map(|r| r.errors.len()).unwrap_or_default();
        info!(job_id = %job_id, status = %status, errors, "Publishing job finished");
        Ok(status)
    }

    /// Create the course; on failure the job is marked `Failed` and `None` is returned.
    async fn create_course(
        &self,
        job_id: JobId,
        spec: &CourseSpec,
    ) -> Result<Option<CourseId>, PublishError> {
        self.jobs.update(job_id, |r| {
            r.current_step = "Creating course".to_string();
        })?;

        let created = bounded(
            self.settings.store_timeout,
            self.store.create_course(CourseDraft::from(spec)),
        )
        .await;

        match created {
            Ok(course_id) => {
                self.jobs.update(job_id, |r| {
                    r.course_id = Some(course_id);
                    r.transition(JobStatus::Running)
                })??;
                info!(job_id = %job_id, course_id = %course_id, "Course created");
                Ok(Some(course_id))
            }
            Err(err) => {
                error!(job_id = %job_id, error = %err, "Course creation failed");
                self.jobs.update(job_id, |r| {
                    r.record_error(
                        EntityRef::Course {
                            title: spec.title.clone(),
                        },
                        store_failure_kind(&err),
                        err.to_string(),
                    );
                    r.current_step = "Failed".to_string();
                    r.transition(JobStatus::Failed)
                })??;
                Ok(None)
            }
        }
    }

    /// Create modules in order and fan out their concepts. Returns whether cancellation
    /// stopped dispatch early.
    async fn dispatch_modules(
        &self,
        job_id: JobId,
        course_id: CourseId,
        spec: &CourseSpec,
    ) -> Result<bool, PublishError> {
        let pool = Arc::new(Semaphore::new(self.settings.worker_pool_size.max(1)));
        let worker = ConceptWorker {
            job_id,
            jobs: self.jobs.clone(),
            store: self.store.clone(),
            generator: self.generator.clone(),
            validator: self.validator.clone(),
            retry: self.settings.retry,
            store_timeout: self.settings.store_timeout,
            max_regenerations: self.settings.max_regenerations,
        };
        let mut in_flight = JoinSet::new();
        let mut cancelled = false;

        'modules: for (position, module) in spec.positioned_modules() {
            if self.jobs.is_cancel_requested(job_id) {
                cancelled = true;
                break;
            }
            self.jobs.update(job_id, |r| {
                r.current_step = format!("Creating module {} of {}", position, spec.modules.len());
            })?;

            let created = bounded(
                self.settings.store_timeout,
                self.store
                    .create_module(course_id, position, ModuleDraft::from(module)),
            )
            .await;
            let module_id = match created {
                Ok(module_id) => module_id,
                Err(err) => {
                    warn!(
                        job_id = %job_id,
                        module_position = position,
                        error = %err,
                        "Module creation failed"
                    );
                    let skipped = u32::try_from(module.concepts.len()).unwrap_or(u32::MAX);
                    self.jobs.update(job_id, |r| {
                        r.progress.module_failed();
                        r.progress.concepts_skipped_by(skipped);
                        r.record_error(
                            EntityRef::Module {
                                position,
                                title: module.title.clone(),
                            },
                            store_failure_kind(&err),
                            err.to_string(),
                        );
                    })?;
                    continue;
                }
            };
            self.jobs.update(job_id, |r| {
                r.progress.module_done();
                r.current_step = format!("Generating concepts for module {}", position);
            })?;
            debug!(job_id = %job_id, module_position = position, module_id = %module_id, "Module created");

            for (order_index, concept) in module.positioned_concepts() {
                let Ok(permit) = pool.clone().acquire_owned().await else {
                    break 'modules;
                };
                if self.jobs.is_cancel_requested(job_id) {
                    cancelled = true;
                    break 'modules;
                }
                let job = ConceptJob {
                    module_id,
                    concept: ConceptRef {
                        module_position: position,
                        order_index,
                        title: concept.title.clone(),
                    },
                    spec: concept.clone(),
                    vars: PromptVariables::for_concept(spec, module, concept),
                };
                in_flight.spawn(worker.clone().run(job, permit));
            }
        }

        if cancelled {
            info!(
                job_id = %job_id,
                in_flight = in_flight.len(),
                "Cancellation observed, waiting for in-flight concepts"
            );
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(err) = joined {
                error!(job_id = %job_id, error = %err, "Concept task aborted");
                self.jobs.update(job_id, |r| {
                    r.progress.concept_failed();
                    r.record_error(
                        EntityRef::Job,
                        ErrorKind::PermanentGeneration,
                        format!("concept task aborted: {}", err),
                    );
                })?;
            }
        }

        Ok(cancelled)
    }
}
