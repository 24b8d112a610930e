//! C11: the worker state machine — `idle -> polling -> running ->
//! reporting -> idle` — with error-class backoff and graceful drain.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::common::AppError;
use crate::kernel::jobs::model::JobPayload;
use crate::worker::backoff::WorkerBackoff;
use crate::worker::client::JobApiClient;
use crate::worker::script_runner::{ScriptOutcome, ScriptRunner};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Reserve-error categories (§4.11). Only the first six back off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NetworkConnection,
    ConnectionRefused,
    DnsResolution,
    Timeout,
    ServerError,
    ClientError,
    RequestAborted,
    JobExecution,
    ApplicationError,
    Unknown,
}

impl ErrorClass {
    pub fn should_back_off(&self) -> bool {
        !matches!(self, ErrorClass::ClientError | ErrorClass::JobExecution | ErrorClass::RequestAborted)
    }

    pub fn classify(err: &AppError) -> Self {
        match err {
            AppError::Timeout(_) => ErrorClass::Timeout,
            AppError::Network(e) => {
                if e.to_string().contains("dns") {
                    ErrorClass::DnsResolution
                } else if e.to_string().contains("refused") {
                    ErrorClass::ConnectionRefused
                } else {
                    ErrorClass::NetworkConnection
                }
            }
            AppError::Cancelled => ErrorClass::RequestAborted,
            AppError::InvalidInput(_) | AppError::Conflict(_) | AppError::NotFound(_) => ErrorClass::ClientError,
            AppError::StoreBackend(_) | AppError::CacheBackend(_) => ErrorClass::ServerError,
            _ => ErrorClass::Unknown,
        }
    }
}

/// Extracts the script (or navigation URL) this worker should run from a
/// job's typed payload view. Exactly one of `script`/`url` is expected for
/// a browser job; other job kinds have no script to run.
fn extract_script(payload: &JobPayload) -> Option<String> {
    match payload {
        JobPayload::Browser(b) => b.script.clone().or_else(|| b.url.clone()),
        _ => None,
    }
}

pub struct WorkerLoop {
    client: Arc<JobApiClient>,
    runner: Arc<dyn ScriptRunner>,
    worker_id: String,
    job_type: String,
    lease: Duration,
    wait: Duration,
    heartbeat_interval: Duration,
    cancel: CancellationToken,
}

impl WorkerLoop {
    pub fn new(
        client: Arc<JobApiClient>,
        runner: Arc<dyn ScriptRunner>,
        worker_id: impl Into<String>,
        job_type: impl Into<String>,
        lease: Duration,
        wait: Duration,
        heartbeat_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            runner,
            worker_id: worker_id.into(),
            job_type: job_type.into(),
            lease,
            wait,
            heartbeat_interval,
            cancel,
        }
    }

    /// Runs until `self.cancel` fires, then drains the in-flight job (if
    /// any) for up to `DRAIN_TIMEOUT` before returning.
    pub async fn run(&self) {
        let mut backoff = WorkerBackoff::new();

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(worker_id = %self.worker_id, "worker stopping, idle");
                return;
            }

            match self.poll_and_execute_one().await {
                Ok(true) => backoff.reset(),
                Ok(false) => {}
                Err(err) => {
                    let class = ErrorClass::classify(&err);
                    tracing::warn!(worker_id = %self.worker_id, error = %err, ?class, "reserve/execute error");
                    if class.should_back_off() {
                        let delay = backoff.next_delay();
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = self.cancel.cancelled() => return,
                        }
                    }
                }
            }
        }
    }

    /// Returns `Ok(true)` if a job was reserved and reported on, `Ok(false)`
    /// if the long-poll simply returned no candidate.
    async fn poll_and_execute_one(&self) -> Result<bool, AppError> {
        let job = self
            .client
            .reserve_next(&self.job_type, self.lease, self.wait, &self.worker_id)
            .await?;

        let Some(job) = job else {
            return Ok(false);
        };

        let payload = job.payload_view().map_err(AppError::Serialization)?;
        let Some(script) = extract_script(&payload) else {
            self.client
                .fail(job.id, &self.worker_id, "job payload has no script or url to run")
                .await?;
            return Ok(true);
        };

        let heartbeat_handle = self.spawn_heartbeat(job.id);
        let job_cancel = self.cancel.child_token();

        let outcome = self.runner.run(&script, job_cancel.clone()).await;
        heartbeat_handle.abort();

        match outcome {
            Ok(ScriptOutcome { success: true, .. }) => {
                self.client.complete(job.id, &self.worker_id).await?;
            }
            Ok(ScriptOutcome { success: false, error }) => {
                if !self.cancel.is_cancelled() {
                    self.client
                        .fail(job.id, &self.worker_id, error.as_deref().unwrap_or("script reported failure"))
                        .await?;
                }
            }
            Err(err) => {
                if !self.cancel.is_cancelled() {
                    self.client.fail(job.id, &self.worker_id, &err.to_string()).await?;
                }
            }
        }

        Ok(true)
    }

    fn spawn_heartbeat(&self, job_id: uuid::Uuid) -> tokio::task::JoinHandle<()> {
        let client = self.client.clone();
        let worker_id = self.worker_id.clone();
        let interval = self.heartbeat_interval;
        let lease = self.lease;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(err) = client.heartbeat(job_id, &worker_id, lease).await {
                    tracing::warn!(%job_id, error = %err, "heartbeat failed");
                }
            }
        })
    }

    /// Signal shutdown; the caller should still await `run()`'s return,
    /// which happens after up to `DRAIN_TIMEOUT` for the in-flight job.
    pub fn request_stop(&self) {
        self.cancel.cancel();
    }

    pub fn drain_timeout() -> Duration {
        DRAIN_TIMEOUT
    }
}
