//! Scheduled task reconciler (C10): keeps the catalog of recurring tasks
//! in sync via `upsert`/`delete_by_task_name`, grounded on `Job::upsert`'s
//! find-then-update-or-insert shape (`kernel/jobs/job.rs`).
//!
//! The actual interval-trigger materializer — the thing that wakes up on
//! a cron tick and turns a due [`ScheduledTask`] into a [`Job`] — is a
//! separate ticker outside this core (the teacher's analogous ticker is
//! `kernel/scheduled_tasks.rs`'s `tokio_cron_scheduler`-driven
//! `start_scheduler`). This module only owns the catalog: `upsert`,
//! `delete_by_task_name`, and `due` (read which tasks are ready to fire,
//! for a ticker to act on) plus `mark_fired` (bookkeeping after it does).

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::kernel::jobs::model::JobKind;

/// A named, cron-driven recurring task, as persisted in the catalog.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScheduledTask {
    pub id: Uuid,
    pub task_name: String,
    pub cron_expr: String,
    pub job_type: JobKind,
    pub payload_template: serde_json::Value,
    pub site_id: Option<Uuid>,
    pub enabled: bool,
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Desired state for a scheduled task, keyed by `task_name`.
#[derive(Debug, Clone)]
pub struct NewScheduledTask {
    pub task_name: String,
    pub cron_expr: String,
    pub job_type: JobKind,
    pub payload_template: serde_json::Value,
    pub site_id: Option<Uuid>,
    pub enabled: bool,
    /// When the task should next fire; `None` means "fire immediately".
    pub next_run_at: Option<DateTime<Utc>>,
}

pub struct ScheduledTaskReconciler {
    pool: PgPool,
}

impl ScheduledTaskReconciler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the task if `task_name` is new, otherwise update its cron
    /// expression, payload template and enabled flag in place. Mirrors
    /// `Job::upsert`'s `ON CONFLICT (...) DO UPDATE`.
    pub async fn upsert(&self, task: NewScheduledTask) -> anyhow::Result<ScheduledTask> {
        let now = Utc::now();
        let next_run_at = task.next_run_at.unwrap_or(now);

        let row = sqlx::query_as::<_, ScheduledTask>(
            r#"
            INSERT INTO scheduled_tasks (
                id, task_name, cron_expr, job_type, payload_template,
                site_id, enabled, next_run_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            ON CONFLICT (task_name) DO UPDATE SET
                cron_expr = EXCLUDED.cron_expr,
                job_type = EXCLUDED.job_type,
                payload_template = EXCLUDED.payload_template,
                site_id = EXCLUDED.site_id,
                enabled = EXCLUDED.enabled,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(crate::common::new_id())
        .bind(&task.task_name)
        .bind(&task.cron_expr)
        .bind(task.job_type)
        .bind(&task.payload_template)
        .bind(task.site_id)
        .bind(task.enabled)
        .bind(next_run_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Remove a task from the catalog by name. A no-op if it doesn't exist.
    pub async fn delete_by_task_name(&self, task_name: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM scheduled_tasks WHERE task_name = $1")
            .bind(task_name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Enabled tasks whose `next_run_at` has passed, for a ticker to fire.
    pub async fn due(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<ScheduledTask>> {
        let tasks = sqlx::query_as::<_, ScheduledTask>(
            "SELECT * FROM scheduled_tasks WHERE enabled AND next_run_at <= $1 ORDER BY next_run_at ASC",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(tasks)
    }

    /// Record that `task_id` fired, scheduling its next occurrence.
    pub async fn mark_fired(&self, task_id: Uuid, next_run_at: DateTime<Utc>) -> anyhow::Result<()> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE scheduled_tasks SET last_run_at = $2, next_run_at = $3, updated_at = $2 WHERE id = $1",
        )
        .bind(task_id)
        .bind(now)
        .bind(next_run_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_task_name(&self, task_name: &str) -> anyhow::Result<Option<ScheduledTask>> {
        let task = sqlx::query_as::<_, ScheduledTask>("SELECT * FROM scheduled_tasks WHERE task_name = $1")
            .bind(task_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_scheduled_task_without_next_run_fires_immediately() {
        let task = NewScheduledTask {
            task_name: "hourly-scrape".into(),
            cron_expr: "0 0 * * * *".into(),
            job_type: JobKind::Browser,
            payload_template: serde_json::json!({"site_id": Uuid::nil()}),
            site_id: None,
            enabled: true,
            next_run_at: None,
        };
        assert!(task.next_run_at.is_none());
    }
}
