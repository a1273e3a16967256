//! In-memory job registry.
//!
//! One `RwLock` guards the whole map so a reader always sees a record either before or after
//! a mutation, never halfway through one.

use crate::course::{validate_request, validate_spec, CourseSpec, PublishRequest};
use crate::error::PublishError;
use crate::job::record::{JobProgress, JobRecord};
use crate::types::JobId;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// How long finished jobs stay queryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Finished jobs older than this are dropped.
    pub max_age: Duration,
    /// Upper bound on the number of finished jobs kept; the oldest go first.
    pub max_finished: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(86_400),
            max_finished: 1000,
        }
    }
}

#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new `Pending` job for a structurally valid spec.
    pub fn create(&self, spec: &CourseSpec) -> Result<JobId, PublishError> {
        validate_spec(spec)?;

        let job_id = JobId::new();
        let progress = JobProgress::for_spec(spec);
        let record = JobRecord::new(job_id, progress);
        self.jobs.write().insert(job_id, record);

        info!(
            job_id = %job_id,
            course = %spec.title,
            modules = progress.modules_total,
            concepts = progress.concepts_total,
            "Publishing job created"
        );
        Ok(job_id)
    }

    /// Register a `Pending` job whose outline is still to be planned. Progress totals stay
    /// at zero until the plan is known.
    pub fn create_planning(&self, request: &PublishRequest) -> Result<JobId, PublishError> {
        validate_request(request)?;

        let job_id = JobId::new();
        let mut record = JobRecord::new(job_id, JobProgress::default());
        record.current_step = "Planning course".to_string();
        self.jobs.write().insert(job_id, record);

        info!(
            job_id = %job_id,
            topic = %request.topic,
            level = %request.level,
            "Planning job created"
        );
        Ok(job_id)
    }

    /// Snapshot of a job record.
    pub fn get(&self, job_id: JobId) -> Result<JobRecord, PublishError> {
        self.jobs
            .read()
            .get(&job_id)
            .cloned()
            .ok_or(PublishError::JobNotFound(job_id))
    }

    /// Apply `mutator` to a job under the write lock.
    ///
    /// Refused with `JobFinalized` once the job has reached a terminal status.
    pub fn update<F, R>(&self, job_id: JobId, mutator: F) -> Result<R, PublishError>
    where
        F: FnOnce(&mut JobRecord) -> R,
    {
        let mut jobs = self.jobs.write();
        let record = jobs
            .get_mut(&job_id)
            .ok_or(PublishError::JobNotFound(job_id))?;
        if record.is_terminal() {
            return Err(PublishError::JobFinalized(job_id));
        }
        let out = mutator(record);
        record.updated_at = Utc::now();
        Ok(out)
    }

    /// Flag a job for cooperative cancellation and return its snapshot.
    ///
    /// Finished jobs are returned unchanged.
    pub fn request_cancel(&self, job_id: JobId) -> Result<JobRecord, PublishError> {
        let mut jobs = self.jobs.write();
        let record = jobs
            .get_mut(&job_id)
            .ok_or(PublishError::JobNotFound(job_id))?;
        if !record.is_terminal() && !record.cancel_requested {
            record.cancel_requested = true;
            record.updated_at = Utc::now();
            info!(job_id = %job_id, status = %record.status, "Cancellation requested");
        }
        Ok(record.clone())
    }

    pub fn is_cancel_requested(&self, job_id: JobId) -> bool {
        self.jobs
            .read()
            .get(&job_id)
            .map(|r| r.cancel_requested)
            .unwrap_or(false)
    }

    /// Drop finished jobs outside the retention policy. Returns how many were removed.
    pub fn prune(&self, policy: &RetentionPolicy, now: DateTime<Utc>) -> usize {
        let max_age = chrono::Duration::from_std(policy.max_age)
            .unwrap_or_else(|_| chrono::Duration::days(365_000));
        let mut jobs = self.jobs.write();
        let before = jobs.len();

        jobs.retain(|_, record| match finished_at(record) {
            Some(finished) => now.signed_duration_since(finished) <= max_age,
            None => true,
        });

        let mut finished: Vec<(DateTime<Utc>, JobId)> = jobs
            .values()
            .filter_map(|r| finished_at(r).map(|at| (at, r.job_id)))
            .collect();
        if finished.len() > policy.max_finished {
            finished.sort_by_key(|(at, _)| std::cmp::Reverse(*at));
            for (_, job_id) in finished.iter().skip(policy.max_finished) {
                jobs.remove(job_id);
            }
        }

        let removed = before - jobs.len();
        if removed > 0 {
            debug!(removed, remaining = jobs.len(), "Pruned finished jobs");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

fn finished_at(record: &JobRecord) -> Option<DateTime<Utc>> {
    if record.is_terminal() {
        Some(record.finished_at.unwrap_or(record.updated_at))
    } else {
        None
    }
}
