//! The job queue core (C9): durable `Create`/`ReserveNext`/`Heartbeat`/
//! `Complete`/`Fail` operations, plus read-side `GetByID`/`Stats`/`List`.
//!
//! Grounded on `kernel/jobs/queue.rs`'s `claim_jobs_internal`/`mark_succeeded`/
//! `mark_failed`, adapted to this crate's simpler four-state `JobStatus` and
//! the spec's `scheduled_at asc, priority desc, id asc` claim ordering.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::AppError;
use crate::kernel::jobs::failure_notifier::FailureNotifier;
use crate::kernel::jobs::model::{CreateJobRequest, Job, JobKind, JobStatus};
use crate::kernel::jobs::notifier::Notifier;

/// Aggregate counts for the `Stats` operation.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct JobStats {
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
}

/// Filter for the `List` operation.
#[derive(Debug, Clone, Default)]
pub struct ListJobsFilter {
    pub job_type: Option<JobKind>,
    pub status: Option<JobStatus>,
    pub site_id: Option<Uuid>,
    pub limit: i64,
    pub offset: i64,
}

impl ListJobsFilter {
    pub fn with_limit(limit: i64) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }
}

/// The C9 job queue operations.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn create(&self, req: CreateJobRequest) -> Result<Job, AppError>;

    async fn reserve_next(
        &self,
        job_type: JobKind,
        lease: Duration,
        worker_id: &str,
    ) -> Result<Option<Job>, AppError>;

    async fn heartbeat(
        &self,
        job_id: Uuid,
        worker_id: &str,
        extend: Duration,
    ) -> Result<bool, AppError>;

    async fn complete(&self, job_id: Uuid, worker_id: &str) -> Result<bool, AppError>;

    async fn fail(&self, job_id: Uuid, worker_id: &str, error: &str) -> Result<bool, AppError>;

    async fn get_by_id(&self, job_id: Uuid) -> Result<Option<Job>, AppError>;

    async fn stats(&self) -> Result<JobStats, AppError>;

    async fn list(&self, filter: ListJobsFilter) -> Result<Vec<Job>, AppError>;
}

/// Postgres-backed implementation, mirroring the teacher's `PostgresJobQueue`.
pub struct PostgresJobQueue {
    pool: PgPool,
    notifier: Arc<Notifier>,
    failure_notifier: Arc<FailureNotifier>,
    default_lease: Duration,
}

impl PostgresJobQueue {
    pub fn new(
        pool: PgPool,
        notifier: Arc<Notifier>,
        failure_notifier: Arc<FailureNotifier>,
        default_lease: Duration,
    ) -> Self {
        Self {
            pool,
            notifier,
            failure_notifier,
            default_lease,
        }
    }

    /// Exponential backoff capped at one hour, matching the teacher's
    /// `2i64.pow(retry_count).min(3600)` curve (seconds).
    fn backoff_seconds(retry_count: i32) -> i64 {
        2i64.saturating_pow(retry_count.max(0) as u32).min(3600)
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn create(&self, req: CreateJobRequest) -> Result<Job, AppError> {
        req.validate()
            .map_err(|e| AppError::InvalidInput(e.to_string()))?;
        let job = req.into_job();

        let row = sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (
                id, job_type, status, priority, payload, metadata,
                site_id, source_id, session_id, is_test,
                scheduled_at, retry_count, max_retries,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(job.id)
        .bind(job.job_type)
        .bind(job.status)
        .bind(job.priority)
        .bind(&job.payload)
        .bind(&job.metadata)
        .bind(job.site_id)
        .bind(job.source_id)
        .bind(job.session_id)
        .bind(job.is_test)
        .bind(job.scheduled_at)
        .bind(job.retry_count)
        .bind(job.max_retries)
        .bind(job.created_at)
        .bind(job.updated_at)
        .fetch_one(&self.pool)
        .await?;

        self.notifier.notify(row.job_type);
        Ok(row)
    }

    async fn reserve_next(
        &self,
        job_type: JobKind,
        lease: Duration,
        worker_id: &str,
    ) -> Result<Option<Job>, AppError> {
        let lease_ms = lease.as_millis() as i64;
        let now = Utc::now();

        let job = sqlx::query_as::<_, Job>(
            r#"
            WITH next_job AS (
                SELECT id FROM jobs
                WHERE job_type = $1
                  AND scheduled_at <= $2
                  AND status = 'pending'
                ORDER BY scheduled_at ASC, priority DESC, id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET status = 'running',
                started_at = COALESCE(started_at, $2),
                lease_expires_at = $2 + ($3 || ' milliseconds')::INTERVAL,
                locked_by = $4,
                updated_at = $2
            FROM next_job
            WHERE jobs.id = next_job.id
            RETURNING jobs.*
            "#,
        )
        .bind(job_type)
        .bind(now)
        .bind(lease_ms)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;

        if job.is_some() {
            tracing::debug!(worker_id, job_type = job_type.as_str(), "reserved job");
        }
        Ok(job)
    }

    async fn heartbeat(
        &self,
        job_id: Uuid,
        worker_id: &str,
        extend: Duration,
    ) -> Result<bool, AppError> {
        let extend_ms = extend.as_millis() as i64;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET lease_expires_at = $2 + ($4 || ' milliseconds')::INTERVAL,
                updated_at = $2
            WHERE id = $1
              AND status = 'running'
              AND locked_by = $3
              AND lease_expires_at > $2
            "#,
        )
        .bind(job_id)
        .bind(now)
        .bind(worker_id)
        .bind(extend_ms)
        .execute(&self.pool)
        .await?;

        tracing::trace!(%job_id, worker_id, "heartbeat");
        Ok(result.rows_affected() > 0)
    }

    async fn complete(&self, job_id: Uuid, worker_id: &str) -> Result<bool, AppError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed',
                completed_at = $2,
                lease_expires_at = NULL,
                locked_by = NULL,
                updated_at = $2
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(job_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let ok = result.rows_affected() > 0;
        if ok {
            tracing::info!(%job_id, worker_id, "job completed");
        }
        Ok(ok)
    }

    async fn fail(&self, job_id: Uuid, worker_id: &str, error: &str) -> Result<bool, AppError> {
        if error.trim().is_empty() {
            return Err(AppError::InvalidInput("error message must not be empty".into()));
        }
        let sanitized = crate::common::error::sanitize_error_message(error, 2000);
        let now = Utc::now();

        let job = sqlx::query_as::<_, Job>(
            r#"SELECT * FROM jobs WHERE id = $1 AND status = 'running'"#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(job) = job else {
            return Ok(false);
        };

        let will_retry = job.retry_count < job.max_retries;

        if will_retry {
            let backoff = Self::backoff_seconds(job.retry_count);
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'pending',
                    retry_count = retry_count + 1,
                    last_error = $2,
                    lease_expires_at = NULL,
                    locked_by = NULL,
                    scheduled_at = $3 + ($4 || ' seconds')::INTERVAL,
                    updated_at = $3
                WHERE id = $1
                "#,
            )
            .bind(job_id)
            .bind(&sanitized)
            .bind(now)
            .bind(backoff)
            .execute(&self.pool)
            .await?;

            self.notifier.notify(job.job_type);
            tracing::warn!(%job_id, worker_id, backoff, "job failed, scheduled retry");
        } else {
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'failed',
                    retry_count = retry_count + 1,
                    last_error = $2,
                    lease_expires_at = NULL,
                    locked_by = NULL,
                    completed_at = $3,
                    updated_at = $3
                WHERE id = $1
                "#,
            )
            .bind(job_id)
            .bind(&sanitized)
            .bind(now)
            .execute(&self.pool)
            .await?;

            tracing::error!(%job_id, worker_id, "job dead-lettered");
            self.failure_notifier
                .notify(job.id, job.job_type, job.site_id, &sanitized)
                .await;
        }

        Ok(true)
    }

    async fn get_by_id(&self, job_id: Uuid) -> Result<Option<Job>, AppError> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    async fn stats(&self) -> Result<JobStats, AppError> {
        let row: (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'pending'),
                COUNT(*) FILTER (WHERE status = 'running'),
                COUNT(*) FILTER (WHERE status = 'completed'),
                COUNT(*) FILTER (WHERE status = 'failed')
            FROM jobs
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(JobStats {
            pending: row.0,
            running: row.1,
            completed: row.2,
            failed: row.3,
        })
    }

    async fn list(&self, filter: ListJobsFilter) -> Result<Vec<Job>, AppError> {
        let limit = if filter.limit <= 0 { 100 } else { filter.limit };

        let jobs = sqlx::query_as::<_, Job>(
            r#"
            SELECT * FROM jobs
            WHERE ($1::job_kind IS NULL OR job_type = $1)
              AND ($2::job_status IS NULL OR status = $2)
              AND ($3::uuid IS NULL OR site_id = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.job_type)
        .bind(filter.status)
        .bind(filter.site_id)
        .bind(limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps_at_one_hour() {
        assert_eq!(PostgresJobQueue::backoff_seconds(0), 1);
        assert_eq!(PostgresJobQueue::backoff_seconds(1), 2);
        assert_eq!(PostgresJobQueue::backoff_seconds(5), 32);
        assert_eq!(PostgresJobQueue::backoff_seconds(20), 3600);
    }

    #[test]
    fn list_filter_defaults_to_a_bounded_limit() {
        let filter = ListJobsFilter::default();
        assert_eq!(filter.limit, 0);
    }
}
