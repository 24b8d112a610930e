//! Shared application state threaded into every handler.

use std::sync::Arc;

use sqlx::PgPool;

use crate::kernel::jobs::{JobQueue, Notifier};
use crate::kernel::telemetry::TelemetryIngestor;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub job_queue: Arc<dyn JobQueue>,
    pub notifier: Arc<Notifier>,
    pub ingestor: Arc<TelemetryIngestor>,
}
