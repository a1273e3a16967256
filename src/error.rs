//! Error types for the course publisher.

use crate::job::JobStatus;
use crate::types::JobId;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// One structural problem found in a submitted course spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecIssue {
    /// Location inside the spec tree, e.g. `modules[2].concepts[1].title`.
    pub path: String,
    pub message: String,
}

impl SpecIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SpecIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// One problem found while checking configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigIssue {
    /// Dotted configuration key, e.g. `orchestrator.worker_pool_size`.
    pub key: String,
    pub message: String,
}

impl ConfigIssue {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

impl From<Vec<ConfigIssue>> for PublishError {
    fn from(issues: Vec<ConfigIssue>) -> Self {
        PublishError::ConfigError(
            issues
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

fn join_issues(issues: &[SpecIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Store-related errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Order index {order_index} is already taken under {parent}")]
    Constraint { parent: String, order_index: u32 },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Failures raised by the model provider HTTP client.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Provider request timed out: {0}")]
    Timeout(String),

    #[error("Provider connection error: {0}")]
    Connection(String),

    #[error("Provider rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Provider request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Provider authentication failed: {0}")]
    AuthFailed(String),

    #[error("Provider refused the prompt: {0}")]
    Refused(String),

    #[error("Provider returned an unusable response: {0}")]
    InvalidResponse(String),

    #[error("Prompt template error: {0}")]
    Template(String),

    #[error("Provider client error: {0}")]
    Client(String),
}

impl ProviderError {
    /// Timeouts, connection drops, rate limits and 5xx answers are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Timeout(_)
            | ProviderError::Connection(_)
            | ProviderError::RateLimited(_) => true,
            ProviderError::Status { status, .. } => *status >= 500,
            ProviderError::AuthFailed(_)
            | ProviderError::Refused(_)
            | ProviderError::InvalidResponse(_)
            | ProviderError::Template(_)
            | ProviderError::Client(_) => false,
        }
    }
}

/// Errors surfaced by the publisher and its job registry.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Course spec rejected: {}", join_issues(.0))]
    SpecValidation(Vec<SpecIssue>),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job {0} has finished and can no longer change")]
    JobFinalized(JobId),

    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Course planning failed: {0}")]
    Planning(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for PublishError {
    fn from(err: config::ConfigError) -> Self {
        PublishError::ConfigError(err.to_string())
    }
}
