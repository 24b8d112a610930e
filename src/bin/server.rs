use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sitewatch_core::kernel::jobs::{FailureNotifier, LoggingFailureSink, Notifier, PostgresJobQueue};
use sitewatch_core::kernel::store::PgTelemetryStore;
use sitewatch_core::kernel::telemetry::TelemetryIngestor;
use sitewatch_core::server::{build_app, AppState};
use sitewatch_core::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sitewatch_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting sitewatch control plane");

    let config = ServerConfig::from_env().context("failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    let notifier = Arc::new(Notifier::new());
    let failure_notifier = Arc::new(FailureNotifier::new(vec![Arc::new(LoggingFailureSink)]));

    let job_queue: Arc<dyn sitewatch_core::kernel::jobs::JobQueue> = Arc::new(PostgresJobQueue::new(
        pool.clone(),
        notifier.clone(),
        failure_notifier.clone(),
        Duration::from_secs(config.default_lease_seconds),
    ));

    let telemetry_store = Arc::new(PgTelemetryStore::new(pool.clone()));
    let ingestor = Arc::new(TelemetryIngestor::new(telemetry_store, Some(job_queue.clone())));

    let reaper = sitewatch_core::kernel::jobs::LeaseReaper::new(
        pool.clone(),
        notifier.clone(),
        failure_notifier.clone(),
    );
    let reap_cancel = tokio_util::sync::CancellationToken::new();
    {
        let reap_cancel = reap_cancel.clone();
        let interval = config.lease_reap_interval;
        tokio::spawn(async move {
            reaper.run(interval, reap_cancel).await;
        });
    }

    let state = AppState {
        db_pool: pool,
        job_queue,
        notifier,
        ingestor,
    };

    let app = build_app(state);

    let addr = format!("{}:{}", config.bind_addr, config.port);
    tracing::info!(%addr, "binding listener");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("failed to bind to address")?;

    axum::serve(listener, app)
        .await
        .context("server error")?;

    reap_cancel.cancel();
    Ok(())
}
