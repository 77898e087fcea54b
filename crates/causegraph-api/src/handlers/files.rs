//! Artifact download handler
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use std::sync::Arc;
use uuid::Uuid;

/// Download a job's persisted graph table as CSV
///
/// Clusterless rows are part of the file even when the job result left
/// them out.
#[utoipa::path(
    get,
    path = "/api/v1/files/{job_id}",
    tag = "files",
    params(
        ("job_id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "CSV artifact", content_type = "text/csv"),
        (status = 404, description = "Job or artifact not found", body = crate::error::ApiError)
    )
)]
pub async fn download_artifact(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.service.job(job_id).await?;
    let bytes = state.service.artifacts().read_raw(job_id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{job_id}.csv\""),
            ),
        ],
        bytes,
    ))
}
