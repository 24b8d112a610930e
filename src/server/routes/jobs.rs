//! The job API (C9): the control-plane surface workers long-poll against.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::kernel::jobs::{CreateJobRequest, Job, JobKind, JobStats, ListJobsFilter};
use crate::server::error::ApiError;
use crate::server::state::AppState;

pub async fn create_job_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> Result<Json<Job>, ApiError> {
    let job = state.job_queue.create(req).await?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
pub struct ReserveQuery {
    job_type: String,
    #[serde(default = "default_lease_seconds")]
    lease_seconds: u64,
    #[serde(default = "default_wait_seconds")]
    wait_seconds: u64,
    worker_id: String,
}

fn default_lease_seconds() -> u64 {
    60
}

fn default_wait_seconds() -> u64 {
    25
}

/// Long-polls up to `wait_seconds` for a reservable job of `job_type`,
/// waking early on a same-kind `Create`/retry notification. Returns 204
/// when the wait window elapses with nothing to hand out.
pub async fn reserve_job_handler(
    State(state): State<AppState>,
    Query(q): Query<ReserveQuery>,
) -> Result<Response, ApiError> {
    let job_type: JobKind = q
        .job_type
        .parse()
        .map_err(|e: anyhow::Error| crate::common::AppError::InvalidInput(e.to_string()))?;
    let lease = Duration::from_secs(q.lease_seconds);
    let wait = Duration::from_secs(q.wait_seconds);

    let deadline = tokio::time::Instant::now() + wait;

    loop {
        if let Some(job) = state
            .job_queue
            .reserve_next(job_type, lease, &q.worker_id)
            .await?
        {
            return Ok(Json(job).into_response());
        }

        let now = tokio::time::Instant::now();
        if now >= deadline {
            return Ok(StatusCode::NO_CONTENT.into_response());
        }

        state.notifier.wait(job_type, deadline - now).await;
    }
}

#[derive(Debug, Deserialize)]
pub struct WorkerQuery {
    worker_id: String,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatQuery {
    worker_id: String,
    #[serde(default = "default_lease_seconds")]
    extend_seconds: u64,
}

pub async fn heartbeat_handler(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Query(q): Query<HeartbeatQuery>,
) -> Result<StatusCode, ApiError> {
    let extended = state
        .job_queue
        .heartbeat(job_id, &q.worker_id, Duration::from_secs(q.extend_seconds))
        .await?;
    Ok(if extended { StatusCode::OK } else { StatusCode::NOT_FOUND })
}

pub async fn complete_job_handler(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Query(q): Query<WorkerQuery>,
) -> Result<StatusCode, ApiError> {
    let ok = state.job_queue.complete(job_id, &q.worker_id).await?;
    Ok(if ok { StatusCode::OK } else { StatusCode::NOT_FOUND })
}

#[derive(Debug, Deserialize)]
pub struct FailBody {
    error: String,
}

pub async fn fail_job_handler(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Query(q): Query<WorkerQuery>,
    Json(body): Json<FailBody>,
) -> Result<StatusCode, ApiError> {
    let ok = state
        .job_queue
        .fail(job_id, &q.worker_id, &body.error)
        .await?;
    Ok(if ok { StatusCode::OK } else { StatusCode::NOT_FOUND })
}

pub async fn get_job_handler(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Job>, ApiError> {
    let job = state
        .job_queue
        .get_by_id(job_id)
        .await?
        .ok_or_else(|| crate::common::AppError::NotFound(format!("job {job_id}")))?;
    Ok(Json(job))
}

pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<JobStats>, ApiError> {
    let stats = state.job_queue.stats().await?;
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    job_type: Option<String>,
    status: Option<String>,
    site_id: Option<Uuid>,
    #[serde(default = "default_list_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_list_limit() -> i64 {
    100
}

pub async fn list_jobs_handler(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<Job>>, ApiError> {
    let job_type = q
        .job_type
        .map(|s| s.parse::<JobKind>())
        .transpose()
        .map_err(|e: anyhow::Error| crate::common::AppError::InvalidInput(e.to_string()))?;
    let status = q
        .status
        .map(|s| match s.as_str() {
            "pending" => Ok(crate::kernel::jobs::JobStatus::Pending),
            "running" => Ok(crate::kernel::jobs::JobStatus::Running),
            "completed" => Ok(crate::kernel::jobs::JobStatus::Completed),
            "failed" => Ok(crate::kernel::jobs::JobStatus::Failed),
            other => Err(crate::common::AppError::InvalidInput(format!(
                "invalid status: {other}"
            ))),
        })
        .transpose()?;

    let filter = ListJobsFilter {
        job_type,
        status,
        site_id: q.site_id,
        limit: q.limit,
        offset: q.offset,
    };

    let jobs = state.job_queue.list(filter).await?;
    Ok(Json(jobs))
}
