//! Job model: the durable, typed unit of work dispatched to workers.
//!
//! See spec §3 ("Job") and §4.9 (C9, the job queue core). The payload is
//! stored as an opaque JSON blob; [`Job::payload_view`] parses it into a
//! typed variant per job kind, following the "tagged variants over raw
//! blobs" redesign note.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::new_id;

/// The four job kinds the core dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Browser,
    Rules,
    Alert,
    SecretRefresh,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Browser => "browser",
            JobKind::Rules => "rules",
            JobKind::Alert => "alert",
            JobKind::SecretRefresh => "secret_refresh",
        }
    }
}

impl std::str::FromStr for JobKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "browser" => Ok(JobKind::Browser),
            "rules" => Ok(JobKind::Rules),
            "alert" => Ok(JobKind::Alert),
            "secret_refresh" => Ok(JobKind::SecretRefresh),
            other => anyhow::bail!("invalid job type: {other}"),
        }
    }
}

/// Job lifecycle status (spec §3 status transitions: `pending -> running
/// -> completed|failed`; on retryable failure, `running -> pending`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// Typed view over a job's opaque `payload` blob, keyed by [`JobKind`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    Browser(BrowserPayload),
    Rules(RulesPayload),
    Alert(AlertPayload),
    SecretRefresh(SecretRefreshPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserPayload {
    /// Either an inline script string, or a `url` to navigate to; exactly
    /// one of `script`/`url` is expected by the worker's ScriptRunner.
    pub script: Option<String>,
    pub url: Option<String>,
    pub site_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesPayload {
    pub event_ids: Vec<Uuid>,
    pub session_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPayload {
    pub rule_type: String,
    pub event_context: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretRefreshPayload {
    pub secret_id: Uuid,
}

/// A unit of dispatchable work.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Job {
    #[builder(default = new_id())]
    pub id: Uuid,

    pub job_type: JobKind,

    #[builder(default)]
    pub status: JobStatus,

    #[builder(default = 50)]
    pub priority: i16,

    pub payload: serde_json::Value,

    #[builder(default = serde_json::json!({}))]
    pub metadata: serde_json::Value,

    #[builder(default, setter(strip_option))]
    pub site_id: Option<Uuid>,
    #[builder(default, setter(strip_option))]
    pub source_id: Option<Uuid>,
    #[builder(default, setter(strip_option))]
    pub session_id: Option<Uuid>,

    #[builder(default = false)]
    pub is_test: bool,

    #[builder(default = Utc::now())]
    pub scheduled_at: DateTime<Utc>,
    #[builder(default, setter(strip_option))]
    pub started_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub completed_at: Option<DateTime<Utc>>,

    #[builder(default = 0)]
    pub retry_count: i32,
    #[builder(default = 3)]
    pub max_retries: i32,
    #[builder(default, setter(strip_option))]
    pub last_error: Option<String>,

    #[builder(default, setter(strip_option))]
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// The worker id that currently holds the lease, set on reservation and
    /// checked by `Heartbeat` so a worker that lost a lease-steal race can't
    /// extend it. `None` once the job is no longer `running`.
    #[builder(default, setter(strip_option))]
    pub locked_by: Option<String>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Parse `payload` into its typed view for `job_type`.
    pub fn payload_view(&self) -> anyhow::Result<JobPayload> {
        let view = match self.job_type {
            JobKind::Browser => JobPayload::Browser(serde_json::from_value(self.payload.clone())?),
            JobKind::Rules => JobPayload::Rules(serde_json::from_value(self.payload.clone())?),
            JobKind::Alert => JobPayload::Alert(serde_json::from_value(self.payload.clone())?),
            JobKind::SecretRefresh => {
                JobPayload::SecretRefresh(serde_json::from_value(self.payload.clone())?)
            }
        };
        Ok(view)
    }

    /// Whether this job is currently owned by a worker (an unexpired lease).
    pub fn is_leased(&self, now: DateTime<Utc>) -> bool {
        matches!(self.lease_expires_at, Some(exp) if exp > now)
    }
}

/// Request to create a new job (spec §4.9 `Create`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub job_type: JobKind,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default = "default_priority")]
    pub priority: i16,
    #[serde(default)]
    pub site_id: Option<Uuid>,
    #[serde(default)]
    pub source_id: Option<Uuid>,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub is_test: bool,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,
}

fn default_priority() -> i16 {
    50
}

fn default_max_retries() -> i32 {
    3
}

impl CreateJobRequest {
    /// Validate per spec §4.9 `Create` error conditions.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0..=100).contains(&self.priority) {
            anyhow::bail!("priority must be in [0,100], got {}", self.priority);
        }
        if self.max_retries < 0 {
            anyhow::bail!("max_retries must be >= 0, got {}", self.max_retries);
        }
        if self.payload.is_null() {
            anyhow::bail!("payload must not be empty");
        }
        Ok(())
    }

    pub fn into_job(self) -> Job {
        Job::builder()
            .job_type(self.job_type)
            .payload(self.payload)
            .metadata(self.metadata)
            .priority(self.priority)
            .site_id(self.site_id)
            .source_id(self.source_id)
            .session_id(self.session_id)
            .is_test(self.is_test)
            .scheduled_at(self.scheduled_at.unwrap_or_else(Utc::now))
            .max_retries(self.max_retries)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> CreateJobRequest {
        CreateJobRequest {
            job_type: JobKind::Rules,
            payload: serde_json::json!({"event_ids": [], "session_id": Uuid::nil()}),
            metadata: serde_json::json!({}),
            priority: 50,
            site_id: None,
            source_id: None,
            session_id: None,
            is_test: false,
            scheduled_at: None,
            max_retries: 3,
        }
    }

    #[test]
    fn new_job_starts_pending() {
        let job = sample_request().into_job();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 0);
    }

    #[test]
    fn rejects_priority_out_of_range() {
        let mut req = sample_request();
        req.priority = 101;
        assert!(req.validate().is_err());

        req.priority = -1;
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_negative_max_retries() {
        let mut req = sample_request();
        req.max_retries = -1;
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_null_payload() {
        let mut req = sample_request();
        req.payload = serde_json::Value::Null;
        assert!(req.validate().is_err());
    }

    #[test]
    fn job_type_round_trips_through_str() {
        for kind in [
            JobKind::Browser,
            JobKind::Rules,
            JobKind::Alert,
            JobKind::SecretRefresh,
        ] {
            let s = kind.as_str();
            let parsed: JobKind = s.parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn invalid_job_type_str_errors() {
        assert!("bogus".parse::<JobKind>().is_err());
    }

    #[test]
    fn payload_view_parses_rules_payload() {
        let job = Job::builder()
            .job_type(JobKind::Rules)
            .payload(serde_json::json!({"event_ids": [Uuid::nil()], "session_id": Uuid::nil()}))
            .build();

        match job.payload_view().unwrap() {
            JobPayload::Rules(p) => assert_eq!(p.event_ids.len(), 1),
            other => panic!("expected Rules payload, got {other:?}"),
        }
    }

    #[test]
    fn is_leased_respects_expiry() {
        let now = Utc::now();
        let mut job = Job::builder()
            .job_type(JobKind::Browser)
            .payload(serde_json::json!({"site_id": Uuid::nil()}))
            .build();

        assert!(!job.is_leased(now));

        job.lease_expires_at = Some(now + chrono::Duration::seconds(30));
        assert!(job.is_leased(now));

        job.lease_expires_at = Some(now - chrono::Duration::seconds(1));
        assert!(!job.is_leased(now));
    }
}
