//! Job submission and lifecycle handlers
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use causegraph_core::{Job, JobFailure, JobRequest, JobResult, JobStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Job submission body
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitJobRequest {
    /// Uploaded dataset file name
    #[schema(example = "weather_reports.csv")]
    pub source_reference: String,

    /// Column holding the text to analyse
    #[schema(example = "text")]
    pub column_name: String,

    /// Group causes and effects into topics
    #[serde(default)]
    #[schema(default = false)]
    pub cluster: bool,

    /// Let the predictor clean text before tagging
    #[serde(default)]
    #[schema(default = false)]
    pub preprocess: bool,
}

impl From<SubmitJobRequest> for JobRequest {
    fn from(req: SubmitJobRequest) -> Self {
        Self {
            source_reference: req.source_reference,
            column_name: req.column_name,
            cluster: req.cluster,
            preprocess: req.preprocess,
        }
    }
}

/// Accepted submission
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubmitJobResponse {
    pub job_id: Uuid,

    /// Jobs ahead of this one (0 = next)
    #[schema(example = 0)]
    pub queue_position: usize,
}

/// Snapshot of a job
#[derive(Debug, Serialize, ToSchema)]
pub struct JobStatusResponse {
    pub job_id: Uuid,

    #[schema(value_type = String, example = "cause_effect")]
    pub status: JobStatus,

    #[schema(example = 120)]
    pub progress: usize,

    #[schema(example = 500)]
    pub total: usize,

    /// Present while queued
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Graph, rows and topics once finished
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub result: Option<Arc<JobResult>>,

    /// Failure kind and message once failed
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub failure: Option<JobFailure>,
}

impl JobStatusResponse {
    fn from_job(job: Job, queue_position: Option<usize>) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            total: job.total,
            queue_position,
            created_at: job.created_at,
            completed_at: job.completed_at,
            result: job.result,
            failure: job.failure,
        }
    }
}

/// Submit a dataset for causal extraction
#[utoipa::path(
    post,
    path = "/api/v1/jobs",
    tag = "jobs",
    request_body = SubmitJobRequest,
    responses(
        (status = 202, description = "Job queued", body = SubmitJobResponse),
        (status = 400, description = "Unknown source or missing column", body = crate::error::ApiError)
    )
)]
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitJobRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.source_reference.trim().is_empty() {
        return Err(AppError::BadRequest(
            "source_reference cannot be empty".to_string(),
        ));
    }

    let submission = state.service.submit(req.into()).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitJobResponse {
            job_id: submission.job_id,
            queue_position: submission.queue_position,
        }),
    ))
}

/// Get a job's status, with its result or failure once terminal
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}",
    tag = "jobs",
    params(
        ("id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job snapshot", body = JobStatusResponse),
        (status = 404, description = "Job not found", body = crate::error::ApiError)
    )
)]
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, AppError> {
    let job = state.service.job(id).await?;
    let queue_position = if job.status == JobStatus::Queued {
        state.service.queue_position(id).await
    } else {
        None
    };

    Ok(Json(JobStatusResponse::from_job(job, queue_position)))
}

/// Delete a queued or finished job and its artifact
#[utoipa::path(
    delete,
    path = "/api/v1/jobs/{id}",
    tag = "jobs",
    params(
        ("id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 204, description = "Job deleted"),
        (status = 404, description = "Job not found", body = crate::error::ApiError),
        (status = 409, description = "Job is running", body = crate::error::ApiError)
    )
)]
pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
