//! HTTP client for the worker's view of the job API control plane.

use std::time::Duration;

use uuid::Uuid;

use crate::common::AppError;
use crate::kernel::jobs::model::Job;

pub struct JobApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl JobApiClient {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// `None` on a 204 (no job available); `Some(job)` on 2xx with a body.
    pub async fn reserve_next(
        &self,
        job_type: &str,
        lease: Duration,
        wait: Duration,
        worker_id: &str,
    ) -> Result<Option<Job>, AppError> {
        let response = self
            .client
            .post(format!("{}/jobs/reserve", self.base_url))
            .query(&[
                ("job_type", job_type.to_string()),
                ("lease_seconds", lease.as_secs().to_string()),
                ("wait_seconds", wait.as_secs().to_string()),
                ("worker_id", worker_id.to_string()),
            ])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let job: Job = response.error_for_status()?.json().await?;
        Ok(Some(job))
    }

    pub async fn heartbeat(&self, job_id: Uuid, worker_id: &str, extend: Duration) -> Result<bool, AppError> {
        let response = self
            .client
            .post(format!("{}/jobs/{job_id}/heartbeat", self.base_url))
            .query(&[("worker_id", worker_id.to_string()), ("extend_seconds", extend.as_secs().to_string())])
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    pub async fn complete(&self, job_id: Uuid, worker_id: &str) -> Result<bool, AppError> {
        let response = self
            .client
            .post(format!("{}/jobs/{job_id}/complete", self.base_url))
            .query(&[("worker_id", worker_id.to_string())])
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    pub async fn fail(&self, job_id: Uuid, worker_id: &str, error: &str) -> Result<bool, AppError> {
        let response = self
            .client
            .post(format!("{}/jobs/{job_id}/fail", self.base_url))
            .query(&[("worker_id", worker_id.to_string())])
            .json(&serde_json::json!({ "error": error }))
            .send()
            .await?;
        Ok(response.status().is_success())
    }
}
