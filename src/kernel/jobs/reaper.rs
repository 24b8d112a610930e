//! Background lease reaper.
//!
//! This is the only path that reclaims a `running` job whose lease expired
//! without a `Complete`/`Fail` report — `ReserveNext`'s claim CTE only ever
//! considers `pending` rows, so a dead worker's job sits `running` until a
//! sweep here requeues it back to `pending` (incrementing `retry_count`) or
//! dead-letters it once retries are exhausted. Shaped after `jobs/worker.rs`'s
//! `Service::run` shutdown drain via `CancellationToken`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::kernel::jobs::failure_notifier::FailureNotifier;
use crate::kernel::jobs::notifier::Notifier;

pub struct LeaseReaper {
    pool: PgPool,
    notifier: Arc<Notifier>,
    failure_notifier: Arc<FailureNotifier>,
}

#[derive(sqlx::FromRow)]
struct ReapedJob {
    id: uuid::Uuid,
    job_type: crate::kernel::jobs::model::JobKind,
    site_id: Option<uuid::Uuid>,
    dead_lettered: bool,
}

impl LeaseReaper {
    pub fn new(pool: PgPool, notifier: Arc<Notifier>, failure_notifier: Arc<FailureNotifier>) -> Self {
        Self {
            pool,
            notifier,
            failure_notifier,
        }
    }

    /// Requeue (or dead-letter) every `running` job whose lease has expired.
    /// Returns the number of jobs touched.
    pub async fn sweep(&self) -> anyhow::Result<usize> {
        let now = Utc::now();

        let reaped = sqlx::query_as::<_, ReapedJob>(
            r#"
            WITH stale AS (
                SELECT id FROM jobs
                WHERE status = 'running' AND lease_expires_at < $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET status = CASE
                    WHEN retry_count + 1 >= max_retries THEN 'failed'
                    ELSE 'pending'
                END,
                retry_count = retry_count + 1,
                last_error = 'lease expired: worker presumed dead',
                lease_expires_at = NULL,
                locked_by = NULL,
                completed_at = CASE
                    WHEN retry_count + 1 >= max_retries THEN $1
                    ELSE completed_at
                END,
                updated_at = $1
            FROM stale
            WHERE jobs.id = stale.id
            RETURNING jobs.id, jobs.job_type, jobs.site_id, (jobs.status = 'failed') AS dead_lettered
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        for job in &reaped {
            if job.dead_lettered {
                self.failure_notifier
                    .notify(job.id, job.job_type, job.site_id, "lease expired: worker presumed dead")
                    .await;
            } else {
                self.notifier.notify(job.job_type);
            }
        }

        if !reaped.is_empty() {
            tracing::warn!(count = reaped.len(), "reaped expired leases");
        }

        Ok(reaped.len())
    }

    /// Run the periodic sweep loop until `cancel` fires.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("lease reaper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep().await {
                        tracing::error!(error = %err, "lease reap sweep failed");
                    }
                }
            }
        }
    }
}
