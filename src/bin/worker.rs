use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sitewatch_core::worker::{JobApiClient, ScriptOutcome, ScriptRunner, WorkerLoop};
use sitewatch_core::WorkerConfig;

/// Placeholder `ScriptRunner`: real browser automation lives outside this
/// core crate (see `worker/script_runner.rs`). This stub simply reports
/// success so the worker loop, lease handling and reporting can be
/// exercised end-to-end without a browser binding.
struct NoopScriptRunner;

#[async_trait::async_trait]
impl ScriptRunner for NoopScriptRunner {
    async fn run(&self, _script: &str, _cancel: CancellationToken) -> anyhow::Result<ScriptOutcome> {
        Ok(ScriptOutcome::success())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sitewatch_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env().context("failed to load worker configuration")?;
    tracing::info!(worker_id = %config.worker_id, job_type = %config.job_type, "starting worker");

    let client = Arc::new(JobApiClient::new(config.api_base_url.clone())?);
    let runner: Arc<dyn sitewatch_core::worker::ScriptRunner> = Arc::new(NoopScriptRunner);
    let cancel = CancellationToken::new();

    let worker_loop = WorkerLoop::new(
        client,
        runner,
        config.worker_id.clone(),
        config.job_type.clone(),
        Duration::from_secs(config.lease_seconds),
        Duration::from_secs(config.wait_seconds),
        Duration::from_secs(config.heartbeat_seconds),
        cancel.clone(),
    );

    let run_handle = tokio::spawn(async move {
        worker_loop.run().await;
    });

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    tracing::info!("shutdown signal received, draining in-flight job");
    cancel.cancel();

    let _ = tokio::time::timeout(WorkerLoop::drain_timeout(), run_handle).await;
    Ok(())
}
