//! One concept's unit of work: generate, validate with regeneration, persist.

use crate::course::{ConceptRef, ConceptSpec};
use crate::error::StoreError;
use crate::generator::Generator;
use crate::job::{EntityRef, ErrorKind, JobStore};
use crate::retry::{RetryFailure, RetryPolicy};
use crate::store::{ConceptDraft, CourseStore};
use crate::types::{JobId, ModuleId};
use crate::validator::{Validator, Verdict};
use crate::workflow::{PromptVariables, WorkflowStep};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, info, warn};

/// Final result of one concept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedConcept {
    pub concept: ConceptRef,
    pub order_index: u32,
    pub content: Option<String>,
    pub outcome: ConceptOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConceptOutcome {
    Success,
    PermanentFailure { kind: ErrorKind, message: String },
}

type Failure = (ErrorKind, String);

fn retry_failure(err: RetryFailure) -> Failure {
    match err {
        RetryFailure::Permanent(message) => (ErrorKind::PermanentGeneration, message),
        exhausted @ RetryFailure::Exhausted { .. } => {
            (ErrorKind::RetriesExhausted, exhausted.to_string())
        }
    }
}

pub(crate) fn store_failure_kind(err: &StoreError) -> ErrorKind {
    match err {
        StoreError::Constraint { .. } => ErrorKind::StoreConstraint,
        StoreError::NotFound { .. } | StoreError::Timeout(_) | StoreError::Backend(_) => {
            ErrorKind::StoreUnavailable
        }
    }
}

/// Store calls are bounded and never retried.
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: std::future::Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

/// Shared collaborators for every concept of one job.
#[derive(Clone)]
pub(crate) struct ConceptWorker {
    pub job_id: JobId,
    pub jobs: Arc<JobStore>,
    pub store: Arc<dyn CourseStore>,
    pub generator: Arc<dyn Generator>,
    pub validator: Option<Arc<dyn Validator>>,
    pub retry: RetryPolicy,
    pub store_timeout: Duration,
    pub max_regenerations: u32,
}

pub(crate) struct ConceptJob {
    pub module_id: ModuleId,
    pub concept: ConceptRef,
    pub spec: ConceptSpec,
    pub vars: PromptVariables,
}

impl ConceptWorker {
    /// Run one concept while holding a pool permit, then record its outcome on the job.
    pub async fn run(self, job: ConceptJob, _permit: OwnedSemaphorePermit) -> GeneratedConcept {
        debug!(
            job_id = %self.job_id,
            module_position = job.concept.module_position,
            order_index = job.concept.order_index,
            "Concept started"
        );

        let result = match self.produce(&job.vars).await {
            Ok(content) => self.persist(&job, content).await,
            Err(failure) => Err(failure),
        };

        let generated = match result {
            Ok(content) => GeneratedConcept {
                order_index: job.concept.order_index,
                concept: job.concept,
                content: Some(content),
                outcome: ConceptOutcome::Success,
            },
            Err((kind, message)) => GeneratedConcept {
                order_index: job.concept.order_index,
                concept: job.concept,
                content: None,
                outcome: ConceptOutcome::PermanentFailure { kind, message },
            },
        };
        self.record(&generated);
        generated
    }

    async fn produce(&self, vars: &PromptVariables) -> Result<String, Failure> {
        let generator = &self.generator;
        let mut content = self
            .retry
            .run("generate", |_| {
                generator.generate(WorkflowStep::ConceptGeneration, vars)
            })
            .await
            .map_err(retry_failure)?;

        let Some(validator) = &self.validator else {
            return Ok(content);
        };

        let mut regenerations = 0;
        loop {
            let current = content.as_str();
            let verdict = self
                .retry
                .run("validate", |_| validator.validate(current))
                .await
                .map_err(retry_failure)?;

            let report = match verdict {
                Verdict::Pass => return Ok(content),
                Verdict::Fail(report) => report,
            };
            if regenerations >= self.max_regenerations {
                return Err((
                    ErrorKind::ValidationRejected,
                    format!(
                        "content rejected after {} regeneration(s): {}",
                        regenerations,
                        report.feedback()
                    ),
                ));
            }
            regenerations += 1;
            debug!(
                job_id = %self.job_id,
                attempt = regenerations,
                feedback = %report.feedback(),
                "Regenerating rejected content"
            );

            let feedback = report.feedback();
            let replacement = self
                .retry
                .run("regenerate", |_| {
                    generator.regenerate(
                        WorkflowStep::ConceptRegeneration,
                        vars,
                        current,
                        &feedback,
                    )
                })
                .await
                .map_err(retry_failure)?;
            content = replacement;
        }
    }

    async fn persist(&self, job: &ConceptJob, content: String) -> Result<String, Failure> {
        let draft = ConceptDraft::from_spec(&job.spec, content.clone());
        bounded(
            self.store_timeout,
            self.store
                .create_concept(job.module_id, job.concept.order_index, draft),
        )
        .await
        .map(|_| content)
        .map_err(|err| (store_failure_kind(&err), err.to_string()))
    }

    fn record(&self, generated: &GeneratedConcept) {
        let concept = &generated.concept;
        let update = match &generated.outcome {
            ConceptOutcome::Success => {
                info!(
                    job_id = %self.job_id,
                    module_position = concept.module_position,
                    order_index = concept.order_index,
                    "Concept created"
                );
                self.jobs.update(self.job_id, |r| r.progress.concept_done())
            }
            ConceptOutcome::PermanentFailure { kind, message } => {
                warn!(
                    job_id = %self.job_id,
                    module_position = concept.module_position,
                    order_index = concept.order_index,
                    kind = ?kind,
                    error = %message,
                    "Concept failed"
                );
                self.jobs.update(self.job_id, |r| {
                    r.progress.concept_failed();
                    r.record_error(EntityRef::from(concept), *kind, message.clone());
                })
            }
        };
        if let Err(err) = update {
            warn!(job_id = %self.job_id, error = %err, "Could not record concept outcome");
        }
    }
}
