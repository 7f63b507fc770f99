// SPDX-License-Identifier: GPL-3.0-or-later
//! Job endpoints: the HTTP face of C6 (spec §4.6, §6's public operations
//! list — `EnqueueJob`, `ListJobs/Active/Finished`, `GetJob`, `CancelJob`,
//! `RetryJob`, `GetJobStats`, `ClearFinishedJobs`).

use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use cratedig_domain::{Job, JobType};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ErrorResponse;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct JobResponse {
    pub id: String,
    pub job_type: String,
    pub status: String,
    pub progress: u8,
    pub source_id: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type.to_string(),
            status: job.status.to_string(),
            progress: job.progress,
            source_id: job.source_id,
            error: job.error,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JobStatsResponse {
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EnqueueJobRequest {
    pub source_id: String,
    /// One of `track`, `album`, `playlist`, `artist`, `sync_file`,
    /// `sync_external`, `sync_catalog`.
    pub job_type: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

impl PageQuery {
    fn paged(&self) -> (i64, i64) {
        (self.page.unwrap_or(0).max(0), self.size.unwrap_or(50).clamp(1, 500))
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/jobs",
    request_body = EnqueueJobRequest,
    responses(
        (status = 200, description = "Job enqueued (or the existing active job for this source/type)", body = JobResponse),
        (status = 500, description = "Persistence failure", body = ErrorResponse)
    ),
    tag = "jobs"
)]
pub async fn enqueue_job(
    State(state): State<AppState>,
    Json(request): Json<EnqueueJobRequest>,
) -> impl IntoResponse {
    let job_type = match JobType::from_str(&request.job_type) {
        Ok(jt) => jt,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: err.to_string(),
                }),
            )
                .into_response()
        }
    };

    match state.jobs.enqueue_job(&request.source_id, job_type).await {
        Ok(job) => Json(JobResponse::from(job)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/jobs",
    params(("page" = Option<i64>, Query), ("size" = Option<i64>, Query)),
    responses((status = 200, description = "All jobs, newest first", body = [JobResponse])),
    tag = "jobs"
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> impl IntoResponse {
    let (page, size) = page.paged();
    match state.jobs.list_jobs(page, size).await {
        Ok(jobs) => Json(jobs.into_iter().map(JobResponse::from).collect::<Vec<_>>()).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/jobs/active",
    params(("page" = Option<i64>, Query), ("size" = Option<i64>, Query)),
    responses((status = 200, description = "Queued and running jobs", body = [JobResponse])),
    tag = "jobs"
)]
pub async fn list_active_jobs(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> impl IntoResponse {
    let (page, size) = page.paged();
    match state.jobs.list_active_jobs(page, size).await {
        Ok(jobs) => Json(jobs.into_iter().map(JobResponse::from).collect::<Vec<_>>()).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/jobs/finished",
    params(("page" = Option<i64>, Query), ("size" = Option<i64>, Query)),
    responses((status = 200, description = "Completed, failed, and cancelled jobs", body = [JobResponse])),
    tag = "jobs"
)]
pub async fn list_finished_jobs(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> impl IntoResponse {
    let (page, size) = page.paged();
    match state.jobs.list_finished_jobs(page, size).await {
        Ok(jobs) => Json(jobs.into_iter().map(JobResponse::from).collect::<Vec<_>>()).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/jobs/stats",
    responses((status = 200, description = "Per-terminal-status counts", body = JobStatsResponse)),
    tag = "jobs"
)]
pub async fn job_stats(State(state): State<AppState>) -> impl IntoResponse {
    match state.jobs.job_stats().await {
        Ok(stats) => Json(JobStatsResponse {
            completed: stats.completed,
            failed: stats.failed,
            cancelled: stats.cancelled,
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/jobs/finished",
    responses((status = 200, description = "Number of finished jobs removed", body = u64)),
    tag = "jobs"
)]
pub async fn clear_finished_jobs(State(state): State<AppState>) -> impl IntoResponse {
    match state.jobs.clear_finished_jobs().await {
        Ok(count) => Json(count).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}",
    params(("id" = String, Path)),
    responses(
        (status = 200, description = "The job", body = JobResponse),
        (status = 404, description = "No such job", body = ErrorResponse)
    ),
    tag = "jobs"
)]
pub async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.jobs.get_job(&id).await {
        Ok(job) => Json(JobResponse::from(job)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/jobs/{id}/cancel",
    params(("id" = String, Path)),
    responses(
        (status = 200, description = "Job marked cancelled"),
        (status = 404, description = "No such job", body = ErrorResponse)
    ),
    tag = "jobs"
)]
pub async fn cancel_job(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.jobs.cancel_job(&id).await {
        Ok(()) => axum::http::StatusCode::OK.into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/jobs/{id}/retry",
    params(("id" = String, Path)),
    responses(
        (status = 200, description = "Job cleared of its error and re-queued", body = JobResponse),
        (status = 404, description = "No such job", body = ErrorResponse)
    ),
    tag = "jobs"
)]
pub async fn retry_job(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.jobs.retry_job(&id).await {
        Ok(job) => Json(JobResponse::from(job)).into_response(),
        Err(err) => err.into_response(),
    }
}
