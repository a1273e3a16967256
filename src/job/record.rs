//! Job Record
//!
//! Status state machine, progress counters and the append-only error list of one job.

use crate::course::{ConceptRef, CourseSpec};
use crate::error::PublishError;
use crate::types::{CourseId, JobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a publishing job.
///
/// `Pending -> Running -> {Completed, PartialFailure, Failed}` plus `Pending -> Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    PartialFailure,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::PartialFailure | JobStatus::Failed
        )
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Running, Completed)
                | (Running, PartialFailure)
                | (Running, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::PartialFailure => "partial_failure",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one job. Every counter only grows, and settled concepts never exceed the total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub modules_total: u32,
    pub modules_done: u32,
    pub modules_failed: u32,
    /// Modules never created because the job was cancelled first.
    #[serde(default)]
    pub modules_skipped: u32,
    pub concepts_total: u32,
    pub concepts_done: u32,
    pub concepts_failed: u32,
    pub concepts_skipped: u32,
}

impl JobProgress {
    pub fn for_spec(spec: &CourseSpec) -> Self {
        Self {
            modules_total: saturating_u32(spec.modules.len()),
            concepts_total: saturating_u32(spec.concept_count()),
            ..Self::default()
        }
    }

    pub fn modules_settled(&self) -> u32 {
        self.modules_done + self.modules_failed + self.modules_skipped
    }

    pub fn modules_remaining(&self) -> u32 {
        self.modules_total.saturating_sub(self.modules_settled())
    }

    pub fn concepts_settled(&self) -> u32 {
        self.concepts_done + self.concepts_failed + self.concepts_skipped
    }

    pub fn concepts_remaining(&self) -> u32 {
        self.concepts_total.saturating_sub(self.concepts_settled())
    }

    pub fn module_done(&mut self) {
        if self.modules_remaining() > 0 {
            self.modules_done += 1;
        }
    }

    pub fn module_failed(&mut self) {
        if self.modules_remaining() > 0 {
            self.modules_failed += 1;
        }
    }

    /// Count up to `count` modules as skipped, capped at what is still unsettled.
    pub fn modules_skipped_by(&mut self, count: u32) {
        self.modules_skipped += count.min(self.modules_remaining());
    }

    pub fn concept_done(&mut self) {
        if self.concepts_remaining() > 0 {
            self.concepts_done += 1;
        }
    }

    pub fn concept_failed(&mut self) {
        if self.concepts_remaining() > 0 {
            self.concepts_failed += 1;
        }
    }

    /// Count up to `count` concepts as skipped, capped at what is still unsettled.
    pub fn concepts_skipped_by(&mut self, count: u32) {
        self.concepts_skipped += count.min(self.concepts_remaining());
    }

    /// Share of modules and concepts that have settled, in percent.
    pub fn percent_complete(&self) -> f64 {
        let total = self.modules_total + self.concepts_total;
        if total == 0 {
            return 0.0;
        }
        let settled = self.modules_settled() + self.concepts_settled();
        f64::from(settled) * 100.0 / f64::from(total)
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// The entity an error entry is recorded against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityRef {
    Job,
    Course {
        title: String,
    },
    Module {
        position: u32,
        title: String,
    },
    Concept {
        module_position: u32,
        order_index: u32,
        title: String,
    },
}

impl From<&ConceptRef> for EntityRef {
    fn from(concept: &ConceptRef) -> Self {
        EntityRef::Concept {
            module_position: concept.module_position,
            order_index: concept.order_index,
            title: concept.title.clone(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Job => f.write_str("job"),
            EntityRef::Course { title } => write!(f, "course '{}'", title),
            EntityRef::Module { position, title } => write!(f, "module {} ('{}')", position, title),
            EntityRef::Concept {
                module_position,
                order_index,
                title,
            } => write!(
                f,
                "module {} concept {} ('{}')",
                module_position, order_index, title
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SpecValidation,
    PermanentGeneration,
    RetriesExhausted,
    ValidationRejected,
    StoreConstraint,
    StoreUnavailable,
    Cancelled,
    /// The generator could not produce a usable course or concept plan.
    Planning,
    /// The orchestrator itself stopped before settling the job.
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobErrorEntry {
    pub entity: EntityRef,
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Point-in-time state of one publishing job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub course_id: Option<CourseId>,
    /// Human readable description of what the orchestrator is doing.
    pub current_step: String,
    pub progress: JobProgress,
    pub errors: Vec<JobErrorEntry>,
    pub cancel_requested: bool,
}

impl JobRecord {
    pub fn new(job_id: JobId, progress: JobProgress) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            finished_at: None,
            course_id: None,
            current_step: "Queued".to_string(),
            progress,
            errors: Vec::new(),
            cancel_requested: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move the job forward. Backward or sideways moves are refused.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), PublishError> {
        if !self.status.can_transition_to(next) {
            return Err(PublishError::InvalidTransition {
                job_id: self.job_id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn record_error(&mut self, entity: EntityRef, kind: ErrorKind, message: impl Into<String>) {
        self.errors.push(JobErrorEntry {
            entity,
            kind,
            message: message.into(),
            at: Utc::now(),
        });
    }

    /// Status a running job settles into once all of its work has finished.
    pub fn settled_status(&self) -> JobStatus {
        if self.errors.is_empty() {
            JobStatus::Completed
        } else {
            JobStatus::PartialFailure
        }
    }
}
