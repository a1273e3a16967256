//! HTTP API for submitting and tracking publishing jobs.

use crate::course::{CourseSpec, PublishRequest};
use crate::error::{PublishError, SpecIssue};
use crate::job::JobStatus;
use crate::publisher::{CoursePublisher, JobStatusView};
use crate::types::JobId;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

pub type SharedState = Arc<CoursePublisher>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishJobResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub message: String,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unprocessable {
        message: String,
        issues: Vec<SpecIssue>,
    },
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, serde_json::json!({"error": msg})),
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, serde_json::json!({"error": msg}))
            }
            ApiError::Unprocessable { message, issues } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::json!({"error": message, "issues": issues}),
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({"error": msg}),
            ),
        };
        (status, Json(body)).into_response()
    }
}

impl From<PublishError> for ApiError {
    fn from(err: PublishError) -> Self {
        match err {
            PublishError::SpecValidation(issues) => ApiError::Unprocessable {
                message: "Course spec is invalid".to_string(),
                issues,
            },
            PublishError::JobNotFound(_) => ApiError::NotFound("Job not found".to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(err) => ApiError::Unprocessable {
                message: err.body_text(),
                issues: Vec::new(),
            },
            other => ApiError::BadRequest(other.body_text()),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/v1/courses/publishJob", post(submit_publish_job))
        .route(
            "/api/v1/courses/planAndPublishJob",
            post(submit_plan_and_publish_job),
        )
        .route(
            "/api/v1/courses/publishJob/{job_id}/status",
            get(get_job_status),
        )
        .route(
            "/api/v1/courses/publishJob/{job_id}/cancel",
            post(cancel_job),
        )
        .route("/health", get(health_check))
}

pub fn build_router(publisher: SharedState) -> Router {
    api_router().with_state(publisher)
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn submit_publish_job(
    State(publisher): State<SharedState>,
    payload: Result<Json<CourseSpec>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(spec) = payload.inspect_err(|e| warn!(error = %e, "Rejected publish request body"))?;
    let job_id = publisher.submit(spec).map_err(|err| {
        if let PublishError::SpecValidation(issues) = &err {
            warn!(issues = issues.len(), "Rejected invalid course spec");
        }
        ApiError::from(err)
    })?;
    info!(job_id = %job_id, "Publishing job accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(PublishJobResponse {
            job_id,
            status: JobStatus::Pending,
            message: "Course publishing job started".to_string(),
        }),
    ))
}

/// Accepts a topic and level plus whatever parts of the outline the caller already has.
async fn submit_plan_and_publish_job(
    State(publisher): State<SharedState>,
    payload: Result<Json<PublishRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) =
        payload.inspect_err(|e| warn!(error = %e, "Rejected planning request body"))?;
    let topic = request.topic;
    let job_id = publisher.submit_request(request).map_err(|err| {
        if let PublishError::SpecValidation(issues) = &err {
            warn!(issues = issues.len(), "Rejected invalid publish request");
        }
        ApiError::from(err)
    })?;
    info!(job_id = %job_id, topic = %topic, "Planning job accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(PublishJobResponse {
            job_id,
            status: JobStatus::Pending,
            message: "Course planning job started".to_string(),
        }),
    ))
}

/// Unknown, expired and malformed ids are all reported as not found.
fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::NotFound("Job not found".to_string()))
}

async fn get_job_status(
    State(publisher): State<SharedState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusView>, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    Ok(Json(publisher.status(job_id)?))
}

async fn cancel_job(
    State(publisher): State<SharedState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    let snapshot = publisher.cancel(job_id)?;
    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}
